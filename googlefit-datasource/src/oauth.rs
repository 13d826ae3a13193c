//! OAuth2 authorization-code flow against Google's endpoints.
use crate::config::Config;
use crate::error::OAuthError;
use chrono::{DateTime, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse, BasicTokenType};
use oauth2::url::Url;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, HttpRequest,
    HttpResponse, RedirectUrl, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested by the "Sign in with Google" link.
pub const FIT_SCOPES: [&str; 13] = [
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/fitness.activity.read",
    "https://www.googleapis.com/auth/fitness.blood_glucose.read",
    "https://www.googleapis.com/auth/fitness.blood_pressure.read",
    "https://www.googleapis.com/auth/fitness.body.read",
    "https://www.googleapis.com/auth/fitness.heart_rate.read",
    "https://www.googleapis.com/auth/fitness.body_temperature.read",
    "https://www.googleapis.com/auth/fitness.location.read",
    "https://www.googleapis.com/auth/fitness.nutrition.read",
    "https://www.googleapis.com/auth/fitness.oxygen_saturation.read",
    "https://www.googleapis.com/auth/fitness.reproductive_health.read",
    "https://www.googleapis.com/auth/fitness.sleep.read",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    pub auth_url: String,
    pub token_url: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        OAuthEndpoints {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }
}

impl OAuthEndpoints {
    pub fn from_config(cfg: &Config) -> Self {
        let defaults = OAuthEndpoints::default();
        OAuthEndpoints {
            auth_url: cfg.auth_url.clone().unwrap_or(defaults.auth_url),
            token_url: cfg.token_url.clone().unwrap_or(defaults.token_url),
        }
    }
}

/// Client registration details taken from the datasource settings.
#[derive(Clone, Copy)]
pub struct Credentials<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_uri: &'a str,
}

/// An access/refresh token pair as persisted in the token cache.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    /// Convert an endpoint response, turning the relative `expires_in` into an absolute expiry.
    pub fn from_response(response: &BasicTokenResponse, now: DateTime<Utc>) -> Self {
        let token_type = match response.token_type() {
            BasicTokenType::Bearer => "Bearer".to_string(),
            BasicTokenType::Mac => "MAC".to_string(),
            BasicTokenType::Extension(other) => other.clone(),
        };
        let expiry = response
            .expires_in()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| now + d);
        Token {
            access_token: response.access_token().secret().clone(),
            token_type,
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expiry,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiry, Some(expiry) if expiry <= now)
    }
}

// Tokens end up in logs through `{:?}`; keep the secrets out.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

fn client(
    endpoints: &OAuthEndpoints,
    client_id: &str,
    client_secret: Option<&str>,
    redirect_uri: &str,
) -> Result<BasicClient, OAuthError> {
    let auth_url = AuthUrl::new(endpoints.auth_url.clone()).map_err(|source| {
        OAuthError::InvalidUrl {
            kind: "auth URL",
            url: endpoints.auth_url.clone(),
            source,
        }
    })?;
    let token_url = TokenUrl::new(endpoints.token_url.clone()).map_err(|source| {
        OAuthError::InvalidUrl {
            kind: "token URL",
            url: endpoints.token_url.clone(),
            source,
        }
    })?;
    let redirect_url = RedirectUrl::new(redirect_uri.to_string()).map_err(|source| {
        OAuthError::InvalidUrl {
            kind: "redirect URI",
            url: redirect_uri.to_string(),
            source,
        }
    })?;
    let client = BasicClient::new(
        ClientId::new(client_id.to_string()),
        client_secret.map(|s| ClientSecret::new(s.to_string())),
        auth_url,
        Some(token_url),
    )
    // Google expects the client credentials in the form body.
    .set_auth_type(AuthType::RequestBody)
    .set_redirect_uri(redirect_url);
    Ok(client)
}

// Sends the token request through the datasource instance's own HTTP client.
async fn send(http_client: &Client, request: HttpRequest) -> Result<HttpResponse, reqwest::Error> {
    let response = http_client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;
    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();
    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

/// Exchange a one-time authorization code for a token. No retries: the code is single use.
pub async fn exchange_code(
    http_client: &Client,
    endpoints: &OAuthEndpoints,
    credentials: Credentials<'_>,
    code: &str,
) -> Result<Token, OAuthError> {
    let client = client(
        endpoints,
        credentials.client_id,
        Some(credentials.client_secret),
        credentials.redirect_uri,
    )?;
    debug!(token_url = %endpoints.token_url, "Exchanging authorization code");

    let response = client
        .exchange_code(AuthorizationCode::new(code.to_string()))
        .request_async(|request| send(http_client, request))
        .await
        .map_err(|e| {
            let reason = match e {
                RequestTokenError::ServerResponse(resp) => resp.to_string(),
                other => other.to_string(),
            };
            warn!(%reason, "Authorization code exchange failed");
            OAuthError::Exchange(reason)
        })?;

    Ok(Token::from_response(&response, Utc::now()))
}

/// Build the consent link that sends the user to Google and back with a one-time code.
pub fn consent_url(
    endpoints: &OAuthEndpoints,
    client_id: &str,
    redirect_uri: &str,
) -> Result<Url, OAuthError> {
    let client = client(endpoints, client_id, None, redirect_uri)?;
    let (url, _state) = client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(FIT_SCOPES.iter().map(|s| Scope::new(s.to_string())))
        .add_extra_param("include_granted_scopes", "true")
        .add_extra_param("access_type", "offline")
        .url();
    Ok(url)
}
