//! Request and response shapes of the plugin host, and the handler contracts
//! a datasource implements.
use crate::frame::Frame;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Configuration of one datasource instance as stored by the host.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceInstanceSettings {
    pub id: i64,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    /// Plaintext settings. Kept raw, the plugin reads single keys out of it.
    #[serde(default)]
    pub json_data: serde_json::Value,
    #[serde(default)]
    pub decrypted_secure_json_data: HashMap<String, String>,
    /// Last modification of the settings. A change means a new instance.
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl DataSourceInstanceSettings {
    /// Decrypted secure value, `None` when absent or empty.
    pub fn secure_value(&self, key: &str) -> Option<&str> {
        self.decrypted_secure_json_data
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// String at `key` in the plaintext settings, empty when missing or not a string.
    pub fn json_string(&self, key: &str) -> &str {
        self.json_data
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }
}

// Only the keys of the secure settings are printed.
impl fmt::Debug for DataSourceInstanceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut secure_keys: Vec<&str> = self
            .decrypted_secure_json_data
            .keys()
            .map(String::as_str)
            .collect();
        secure_keys.sort_unstable();
        f.debug_struct("DataSourceInstanceSettings")
            .field("id", &self.id)
            .field("uid", &self.uid)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("json_data", &self.json_data)
            .field("decrypted_secure_json_data", &secure_keys)
            .field("updated", &self.updated)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginContext {
    #[serde(default)]
    pub org_id: i64,
    #[serde(default)]
    pub plugin_id: String,
    #[serde(default)]
    pub data_source_instance_settings: Option<DataSourceInstanceSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    pub ref_id: String,
    #[serde(default)]
    pub query_type: String,
    #[serde(default)]
    pub max_data_points: i64,
    #[serde(default)]
    pub interval_ms: i64,
    pub time_range: TimeRange,
    /// Raw per-query model sent by the frontend.
    #[serde(default)]
    pub json: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDataRequest {
    #[serde(default)]
    pub plugin_context: PluginContext,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub queries: Vec<DataQuery>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct DataResponse {
    #[serde(default)]
    pub frames: Vec<Frame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DataResponse {
    pub fn from_error(error: impl ToString) -> Self {
        DataResponse {
            frames: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Responses keyed by the RefID of the query that produced them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QueryDataResponse {
    pub responses: BTreeMap<String, DataResponse>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckHealthRequest {
    #[serde(default)]
    pub plugin_context: PluginContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Unknown,
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CheckHealthResult {
    pub status: HealthStatus,
    pub message: String,
}

impl CheckHealthResult {
    pub fn ok(message: impl Into<String>) -> Self {
        CheckHealthResult {
            status: HealthStatus::Ok,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        CheckHealthResult {
            status: HealthStatus::Error,
            message: message.into(),
        }
    }
}

/// Handles a batch of data queries.
#[async_trait]
pub trait QueryDataHandler: Send + Sync {
    async fn query_data(&self, request: QueryDataRequest) -> anyhow::Result<QueryDataResponse>;
}

/// Handles health checks, typically the "Save & test" button of the datasource page.
#[async_trait]
pub trait CheckHealthHandler: Send + Sync {
    async fn check_health(&self, request: CheckHealthRequest) -> anyhow::Result<CheckHealthResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_accessors_treat_empty_as_missing() {
        let settings: DataSourceInstanceSettings = serde_json::from_value(json!({
            "id": 3,
            "jsonData": { "clientId": "abc", "redirectURI": 42 },
            "decryptedSecureJsonData": { "code": "", "clientSecret": "s3cret" }
        }))
        .expect("settings");
        assert_eq!(settings.secure_value("code"), None);
        assert_eq!(settings.secure_value("missing"), None);
        assert_eq!(settings.secure_value("clientSecret"), Some("s3cret"));
        assert_eq!(settings.json_string("clientId"), "abc");
        assert_eq!(settings.json_string("redirectURI"), "");
        assert_eq!(settings.json_string("nope"), "");
    }

    #[test]
    fn settings_debug_hides_secure_values() {
        let settings: DataSourceInstanceSettings = serde_json::from_value(json!({
            "id": 9,
            "jsonData": { "clientId": "abc" },
            "decryptedSecureJsonData": { "code": "4/one-time", "clientSecret": "s3cret" }
        }))
        .expect("settings");
        let printed = format!("{:?}", settings);
        assert!(printed.contains("clientSecret"), "{}", printed);
        assert!(printed.contains("abc"), "{}", printed);
        assert!(!printed.contains("s3cret"), "{}", printed);
        assert!(!printed.contains("4/one-time"), "{}", printed);
    }

    #[test]
    fn health_status_uses_host_names() {
        let v = serde_json::to_value(CheckHealthResult::error("boom")).expect("serialize");
        assert_eq!(v, json!({ "status": "ERROR", "message": "boom" }));
        let v = serde_json::to_value(HealthStatus::Ok).expect("serialize");
        assert_eq!(v, json!("OK"));
    }

    #[test]
    fn query_request_parses_host_payload() {
        let req: QueryDataRequest = serde_json::from_value(json!({
            "pluginContext": { "orgId": 1, "pluginId": "p" },
            "queries": [{
                "refId": "A",
                "timeRange": { "from": "2024-01-01T00:00:00Z", "to": "2024-01-01T01:00:00Z" },
                "json": { "format": "table" }
            }]
        }))
        .expect("request");
        assert_eq!(req.queries.len(), 1);
        assert_eq!(req.queries[0].ref_id, "A");
        assert_eq!(req.queries[0].json["format"], "table");
        assert!(req.plugin_context.data_source_instance_settings.is_none());
    }
}
