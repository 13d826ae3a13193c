//! On-disk token cache: one JSON file per datasource instance.
use crate::error::CacheError;
use crate::oauth::Token;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, info};

pub const PLUGINS_DIR_ENV: &str = "PLUGINS_DIR";
pub const DEFAULT_PLUGINS_DIR: &str = "/var/lib/grafana/plugins";

#[derive(Debug, Clone)]
pub struct TokenCache {
    dir: PathBuf,
}

/// Pick the plugins directory: explicit override, then `$PLUGINS_DIR`, then the default.
fn resolve_base(override_dir: Option<&Path>, env: Option<OsString>) -> PathBuf {
    override_dir
        .map(Path::to_path_buf)
        .or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PLUGINS_DIR))
}

impl TokenCache {
    pub fn new(base_dir: impl AsRef<Path>, plugin_name: &str) -> Self {
        TokenCache {
            dir: base_dir.as_ref().join(plugin_name).join("cache"),
        }
    }

    pub fn from_env(plugin_name: &str, override_dir: Option<&Path>) -> Self {
        let base = resolve_base(override_dir, std::env::var_os(PLUGINS_DIR_ENV));
        let cache = TokenCache::new(base, plugin_name);
        info!(dir = %cache.dir.display(), "Token cache directory");
        cache
    }

    #[cfg(test)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, datasource_id: i64) -> PathBuf {
        self.dir.join(format!("{}.json", datasource_id))
    }

    /// Store `token` for the datasource, replacing any previous one.
    pub async fn save(&self, datasource_id: i64, token: &Token) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| CacheError::io(&self.dir, source))?;

        let path = self.path_for(datasource_id);
        let body = serde_json::to_vec(token)?;
        let dir = self.dir.clone();
        let target = path.clone();
        // Every write gets its own temp file in the cache dir and is renamed over the
        // target, so concurrent saves never share a file and readers never see a partial one.
        tokio::task::spawn_blocking(move || -> Result<(), CacheError> {
            let mut tmp =
                NamedTempFile::new_in(&dir).map_err(|source| CacheError::io(&dir, source))?;
            let tmp_path = tmp.path().to_path_buf();
            tmp.write_all(&body)
                .map_err(|source| CacheError::io(&tmp_path, source))?;
            tmp.persist(&target)
                .map_err(|e| CacheError::io(&target, e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::io(&path, std::io::Error::other(e)))??;

        debug!(datasource_id, path = %path.display(), "Token cached");
        Ok(path)
    }

    pub async fn load(&self, datasource_id: i64) -> Result<Token, CacheError> {
        let path = self.path_for(datasource_id);
        let contents = fs::read(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CacheError::NotFound { path: path.clone() }
            } else {
                CacheError::io(&path, source)
            }
        })?;
        Ok(serde_json::from_slice(&contents)?)
    }
}
