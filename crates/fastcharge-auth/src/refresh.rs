use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

pub const REFRESH_ID_TOKEN_PATH: &str = "/refresh-idtoken";
const REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

/// Token pair returned by a refresh endpoint.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedTokens {
    pub id_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for RefreshedTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RefreshedTokens([REDACTED])")
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("token refresh request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token refresh rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("token refresh returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("no refresh token is stored for this profile")]
    MissingRefreshToken,
    #[error("no refresh endpoint is configured for backend-issued tokens")]
    NotConfigured,
}

/// Exchanges a refresh token for a new token pair.
pub trait TokenRefresher: Send + Sync {
    fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError>;
}

/// POSTs `{"refreshToken": ..}` and expects `{"idToken": .., "refreshToken": ..}`.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    url: String,
    http: reqwest::blocking::Client,
}

impl HttpTokenRefresher {
    pub fn new(url: impl Into<String>) -> Result<Self, RefreshError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REFRESH_TIMEOUT)
            .build()?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }

    /// Refresher for the auth service's identity-provider endpoint.
    pub fn identity_provider(auth_service_url: &str) -> Result<Self, RefreshError> {
        Self::new(format!(
            "{}{REFRESH_ID_TOKEN_PATH}",
            auth_service_url.trim_end_matches('/')
        ))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TokenRefresher for HttpTokenRefresher {
    fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError> {
        if refresh_token.trim().is_empty() {
            return Err(RefreshError::MissingRefreshToken);
        }
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "refreshToken": refresh_token }))
            .send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), url = %self.url, "token refresh rejected");
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let tokens: RefreshedTokens = serde_json::from_str(&body)
            .map_err(|error| RefreshError::InvalidResponse(error.to_string()))?;
        if tokens.id_token.trim().is_empty() {
            return Err(RefreshError::InvalidResponse("empty idToken".to_string()));
        }
        Ok(tokens)
    }
}
