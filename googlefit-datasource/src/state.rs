use crate::cache::TokenCache;
use crate::config::Config;
use crate::datasource::GoogleFitDatasource;
use crate::instance::HttpSettings;
use crate::oauth::OAuthEndpoints;
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::{debug, info};

pub struct AppState {
    pub datasource: GoogleFitDatasource,
    pub max_request_body_bytes: usize,
}

impl AppState {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let http = HttpSettings {
            timeout: Duration::from_secs(cfg.timeout_secs.unwrap_or(10)),
            connect_timeout: cfg.connect_timeout_secs.map(Duration::from_secs),
        };
        debug!("Datasource HTTP settings: {:?}", http);

        let endpoints = OAuthEndpoints::from_config(cfg);
        // Fail at startup rather than on the first health check.
        for (kind, url) in [("auth", &endpoints.auth_url), ("token", &endpoints.token_url)] {
            reqwest::Url::parse(url)
                .map_err(|e| anyhow::anyhow!("Invalid OAuth {} URL '{}': {}", kind, url, e))?;
        }
        info!(
            "OAuth endpoints: auth='{}' token='{}'",
            endpoints.auth_url, endpoints.token_url
        );

        let max_instances = NonZeroUsize::new(cfg.max_instances.unwrap_or(64))
            .ok_or_else(|| anyhow::anyhow!("max_instances must be greater than zero"))?;

        const DEFAULT_MAX_BODY_BYTES: usize = 1_048_576; // 1 MiB
        let max_request_body_bytes = cfg.max_request_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
        debug!("Maximum request body size: {} bytes", max_request_body_bytes);

        let cache = TokenCache::from_env(cfg.plugin_name(), cfg.plugins_dir.as_deref());
        let datasource = GoogleFitDatasource::new(cache, endpoints, http, max_instances);

        Ok(AppState {
            datasource,
            max_request_body_bytes,
        })
    }
}
