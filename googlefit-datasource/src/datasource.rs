use crate::backend::{
    CheckHealthHandler, CheckHealthRequest, CheckHealthResult, DataQuery, DataResponse,
    QueryDataHandler, QueryDataRequest, QueryDataResponse,
};
use crate::cache::TokenCache;
use crate::frame::{Field, Frame};
use crate::instance::{DatasourceInstance, HttpSettings, InstanceManager};
use crate::oauth::{self, Credentials, OAuthEndpoints};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::num::NonZeroUsize;
use tracing::{debug, error, info, warn};

pub const MSG_MISSING_SETTINGS: &str = "Datasource settings are missing";
pub const MSG_MISSING_CODE: &str = "Code is not provided. Please press \"Sign in with Google\"";
pub const MSG_MISSING_CLIENT_SECRET: &str = "Client secret is not provided";
pub const MSG_MISSING_CLIENT_ID: &str = "Client ID is not provided";
pub const MSG_MISSING_REDIRECT_URI: &str = "Redirect URI is not provided";
pub const MSG_AUTH_FAILED: &str = "Error authorizing";
pub const MSG_INSTANCE_FAILED: &str = "Could not create datasource instance";
pub const MSG_OK: &str =
    "Everything is okay. Please do not resave, as the auth code is invalidated already.";

/// Per-query model sent by the query editor.
#[derive(Debug, Default, Deserialize)]
struct QueryModel {
    #[serde(default)]
    format: String,
}

/// Google Fit datasource backend.
///
/// Queries answer with placeholder data. The health check turns the one-time
/// authorization code from the settings into a token and caches it on disk.
pub struct GoogleFitDatasource {
    instances: InstanceManager<DatasourceInstance>,
    cache: TokenCache,
    endpoints: OAuthEndpoints,
}

impl GoogleFitDatasource {
    pub fn new(
        cache: TokenCache,
        endpoints: OAuthEndpoints,
        http: HttpSettings,
        max_instances: NonZeroUsize,
    ) -> Self {
        let instances =
            InstanceManager::new(max_instances, move |settings| DatasourceInstance::new(settings, http));
        GoogleFitDatasource {
            instances,
            cache,
            endpoints,
        }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    pub fn endpoints(&self) -> &OAuthEndpoints {
        &self.endpoints
    }

    // Queries do not use the token yet; report what a real fetch would find.
    async fn log_cached_token(&self, datasource_id: i64) {
        match self.cache.load(datasource_id).await {
            Ok(token) if token.is_expired(Utc::now()) => {
                debug!(datasource_id, "Cached token has expired")
            }
            Ok(_) => debug!(datasource_id, "Cached token available"),
            Err(e) => debug!(datasource_id, "No usable cached token: {}", e),
        }
    }

    fn query(&self, query: &DataQuery) -> DataResponse {
        let model: QueryModel = match serde_json::from_value(query.json.clone()) {
            Ok(m) => m,
            Err(e) => {
                debug!(ref_id = %query.ref_id, "Invalid query model: {}", e);
                return DataResponse::from_error(e);
            }
        };

        if model.format.is_empty() {
            warn!("format is empty. defaulting to time series");
        }

        let frame = Frame::new("response")
            .with_field(Field::time(
                "time",
                vec![query.time_range.from, query.time_range.to],
            ))
            .with_field(Field::int64("values", vec![10, 20]));

        DataResponse {
            frames: vec![frame],
            error: None,
        }
    }
}

#[async_trait]
impl QueryDataHandler for GoogleFitDatasource {
    async fn query_data(&self, request: QueryDataRequest) -> anyhow::Result<QueryDataResponse> {
        debug!("Received {} query(ies)", request.queries.len());
        if let Some(settings) = &request.plugin_context.data_source_instance_settings {
            self.log_cached_token(settings.id).await;
        }
        let mut response = QueryDataResponse::default();
        for q in &request.queries {
            let res = self.query(q);
            response.responses.insert(q.ref_id.clone(), res);
        }
        Ok(response)
    }
}

#[async_trait]
impl CheckHealthHandler for GoogleFitDatasource {
    async fn check_health(&self, request: CheckHealthRequest) -> anyhow::Result<CheckHealthResult> {
        let settings = match request.plugin_context.data_source_instance_settings {
            Some(s) => s,
            None => return Ok(CheckHealthResult::error(MSG_MISSING_SETTINGS)),
        };

        let code = match settings.secure_value("code") {
            Some(v) => v,
            None => return Ok(CheckHealthResult::error(MSG_MISSING_CODE)),
        };
        let client_secret = match settings.secure_value("clientSecret") {
            Some(v) => v,
            None => return Ok(CheckHealthResult::error(MSG_MISSING_CLIENT_SECRET)),
        };
        let client_id = settings.json_string("clientId");
        if client_id.is_empty() {
            return Ok(CheckHealthResult::error(MSG_MISSING_CLIENT_ID));
        }
        let redirect_uri = settings.json_string("redirectURI");
        if redirect_uri.is_empty() {
            return Ok(CheckHealthResult::error(MSG_MISSING_REDIRECT_URI));
        }
        debug!(datasource_id = settings.id, client_id, redirect_uri, "Settings validated");

        let instance = match self.instances.get(&settings) {
            Ok(i) => i,
            Err(e) => {
                error!(datasource_id = settings.id, "Failed to create instance: {}", e);
                return Ok(CheckHealthResult::error(MSG_INSTANCE_FAILED));
            }
        };

        let credentials = Credentials {
            client_id,
            client_secret,
            redirect_uri,
        };
        let token =
            match oauth::exchange_code(&instance.http_client, &self.endpoints, credentials, code)
                .await
            {
                Ok(t) => t,
                Err(e) => {
                    warn!(datasource_id = settings.id, "Authorization failed: {}", e);
                    return Ok(CheckHealthResult::error(MSG_AUTH_FAILED));
                }
            };

        // The code is spent at this point, so a failed write still reports success.
        match self.cache.save(settings.id, &token).await {
            Ok(path) => info!(datasource_id = settings.id, path = %path.display(), "Token stored"),
            Err(e) => error!(datasource_id = settings.id, "Failed to store token: {}", e),
        }

        Ok(CheckHealthResult::ok(MSG_OK))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DataSourceInstanceSettings, HealthStatus, PluginContext, TimeRange};
    use crate::frame::FieldValues;
    use crate::oauth::tests::{spawn_token_server, token_body};
    use axum::http::StatusCode;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn datasource(dir: &TempDir, token_url: &str) -> GoogleFitDatasource {
        GoogleFitDatasource::new(
            TokenCache::new(dir.path(), "googlefit"),
            OAuthEndpoints {
                token_url: token_url.to_string(),
                ..Default::default()
            },
            HttpSettings {
                timeout: Duration::from_secs(5),
                connect_timeout: None,
            },
            NonZeroUsize::new(4).unwrap(),
        )
    }

    fn query(ref_id: &str, json: serde_json::Value) -> DataQuery {
        DataQuery {
            ref_id: ref_id.to_string(),
            query_type: String::new(),
            max_data_points: 100,
            interval_ms: 1000,
            time_range: TimeRange {
                from: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                to: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            },
            json,
        }
    }

    fn health_request(json_data: serde_json::Value, secure: &[(&str, &str)]) -> CheckHealthRequest {
        CheckHealthRequest {
            plugin_context: PluginContext {
                data_source_instance_settings: Some(DataSourceInstanceSettings {
                    id: 12,
                    json_data,
                    decrypted_secure_json_data: secure
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        }
    }

    fn full_json() -> serde_json::Value {
        json!({ "clientId": "cid", "redirectURI": "http://localhost:3000/datasources/edit/12" })
    }

    const FULL_SECURE: [(&str, &str); 2] = [("code", "4/code"), ("clientSecret", "secret")];

    #[tokio::test]
    async fn responses_are_keyed_by_ref_id() {
        let tmp = TempDir::new().unwrap();
        let ds = datasource(&tmp, "http://127.0.0.1:9/token");
        let req = QueryDataRequest {
            queries: vec![
                query("A", json!({ "format": "time_series" })),
                query("B", json!({})),
                query("C", json!({ "format": "table", "extra": 1 })),
            ],
            ..Default::default()
        };
        let res = ds.query_data(req).await.expect("query");
        let keys: Vec<&str> = res.responses.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn stub_frame_has_two_points() {
        let tmp = TempDir::new().unwrap();
        let ds = datasource(&tmp, "http://127.0.0.1:9/token");
        let q = query("A", json!({ "format": "whatever", "constant": 6.5 }));
        let res = ds
            .query_data(QueryDataRequest {
                queries: vec![q.clone()],
                ..Default::default()
            })
            .await
            .expect("query");
        let resp = &res.responses["A"];
        assert!(resp.error.is_none());
        assert_eq!(resp.frames.len(), 1);
        let frame = &resp.frames[0];
        assert_eq!(frame.name, "response");
        assert_eq!(frame.rows(), 2);
        assert_eq!(
            frame.fields[0].values,
            FieldValues::Time(vec![q.time_range.from, q.time_range.to])
        );
        assert_eq!(frame.fields[1].values, FieldValues::Int64(vec![10, 20]));
    }

    #[tokio::test]
    async fn invalid_query_model_sets_error() {
        let tmp = TempDir::new().unwrap();
        let ds = datasource(&tmp, "http://127.0.0.1:9/token");
        let res = ds
            .query_data(QueryDataRequest {
                queries: vec![query("A", json!({ "format": 3 })), query("B", json!(null))],
                ..Default::default()
            })
            .await
            .expect("query");
        assert!(res.responses["A"].error.is_some());
        assert!(res.responses["A"].frames.is_empty());
        assert!(res.responses["B"].error.is_some());
    }

    #[tokio::test]
    async fn health_check_reports_missing_fields_in_order() {
        let tmp = TempDir::new().unwrap();
        let ds = datasource(&tmp, "http://127.0.0.1:9/token");
        let cases = vec![
            (health_request(json!({}), &[]), MSG_MISSING_CODE),
            (
                health_request(full_json(), &[("code", ""), ("clientSecret", "s")]),
                MSG_MISSING_CODE,
            ),
            (health_request(json!({}), &[("code", "c")]), MSG_MISSING_CLIENT_SECRET),
            (health_request(json!(null), &FULL_SECURE), MSG_MISSING_CLIENT_ID),
            (health_request(json!("text"), &FULL_SECURE), MSG_MISSING_CLIENT_ID),
            (health_request(json!([1]), &FULL_SECURE), MSG_MISSING_CLIENT_ID),
            (
                health_request(json!({ "redirectURI": "http://x" }), &FULL_SECURE),
                MSG_MISSING_CLIENT_ID,
            ),
            (
                health_request(json!({ "clientId": "cid", "redirectURI": "" }), &FULL_SECURE),
                MSG_MISSING_REDIRECT_URI,
            ),
        ];
        for (req, expected) in cases {
            let res = ds.check_health(req).await.expect("health");
            assert_eq!(res.status, HealthStatus::Error);
            assert_eq!(res.message, expected);
        }

        let res = ds
            .check_health(CheckHealthRequest::default())
            .await
            .expect("health");
        assert_eq!(res, CheckHealthResult::error(MSG_MISSING_SETTINGS));
    }

    #[tokio::test]
    async fn successful_health_check_caches_token() {
        let (url, received) = spawn_token_server(StatusCode::OK, token_body()).await;
        let tmp = TempDir::new().unwrap();
        let ds = datasource(&tmp, &url);

        let res = ds
            .check_health(health_request(full_json(), &FULL_SECURE))
            .await
            .expect("health");
        assert_eq!(res, CheckHealthResult::ok(MSG_OK));
        assert!(received.lock().await.is_some());

        let path = tmp.path().join("googlefit/cache/12.json");
        let raw = std::fs::read(&path).expect("cache file");
        let token: oauth::Token = serde_json::from_slice(&raw).expect("token json");
        assert_eq!(token.access_token, "ya29.access");
        assert_eq!(ds.cache().load(12).await.expect("load"), token);
    }

    #[tokio::test]
    async fn failed_exchange_is_generic_and_keeps_cache() {
        let (url, _) = spawn_token_server(
            StatusCode::UNAUTHORIZED,
            json!({ "error": "invalid_client" }),
        )
        .await;
        let tmp = TempDir::new().unwrap();
        let ds = datasource(&tmp, &url);

        let res = ds
            .check_health(health_request(full_json(), &FULL_SECURE))
            .await
            .expect("health");
        assert_eq!(res, CheckHealthResult::error(MSG_AUTH_FAILED));
        assert!(!ds.cache().path_for(12).exists());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_auth_failure() {
        let tmp = TempDir::new().unwrap();
        let ds = datasource(&tmp, "http://127.0.0.1:9/token");
        let res = ds
            .check_health(health_request(full_json(), &FULL_SECURE))
            .await
            .expect("health");
        assert_eq!(res.message, MSG_AUTH_FAILED);
    }
}
