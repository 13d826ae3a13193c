use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_PLUGIN_NAME: &str = "serge1peshcoff-googlefit-datasource";

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    pub listen: Option<String>,
    // Base directory for token cache files. Takes precedence over $PLUGINS_DIR.
    pub plugins_dir: Option<PathBuf>,
    // Directory name under the plugins dir. Defaults to the plugin ID.
    pub plugin_name: Option<String>,
    // Overall timeout for token exchange requests. Defaults to 10 seconds.
    pub timeout_secs: Option<u64>,
    // Connection timeout in seconds for the token endpoint.
    // If not set, uses reqwest's default behavior (no specific connect timeout).
    pub connect_timeout_secs: Option<u64>,
    // Maximum number of datasource instances kept alive. Defaults to 64.
    pub max_instances: Option<usize>,
    // Maximum request body size in bytes for the query and health routes.
    // If not set, defaults to 1 MiB.
    pub max_request_body_bytes: Option<usize>,
    // OAuth2 endpoints. Default to Google's.
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let cfg_str = fs::read_to_string(path)?;
        Ok(toml::from_str(&cfg_str)?)
    }

    /// Load the config file at `path`, or fall back to defaults when it does not exist.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
                .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path, e))
        } else {
            Ok(Config::default())
        }
    }

    pub fn plugin_name(&self) -> &str {
        self.plugin_name.as_deref().unwrap_or(DEFAULT_PLUGIN_NAME)
    }
}
