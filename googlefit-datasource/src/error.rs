//! Errors raised by the OAuth2 client and the token cache.
use std::path::PathBuf;

/// Failures of the authorization-code exchange.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("invalid {kind} '{url}': {source}")]
    InvalidUrl {
        kind: &'static str,
        url: String,
        #[source]
        source: oauth2::url::ParseError,
    },

    #[error("token exchange failed: {0}")]
    Exchange(String),
}

/// Failures reading or writing cached tokens.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("no cached token at {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("token cache I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid cached token: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
