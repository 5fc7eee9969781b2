use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DataApiError, DataApiErrorKind};

pub const DEFAULT_DATA_API_TIMEOUT_MS: u64 = 15_000;

/// Caller identity attached to every request as headers.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DataApiIdentity {
    pub id_token: Option<String>,
    pub email: Option<String>,
    pub user_pk: Option<String>,
}

impl std::fmt::Debug for DataApiIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataApiIdentity")
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("email", &self.email)
            .field("user_pk", &self.user_pk)
            .finish()
    }
}

#[derive(Serialize)]
struct GraphqlRequest<'a, V: Serialize> {
    query: &'a str,
    variables: &'a V,
}

#[derive(Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlErrorEntry>,
}

#[derive(Deserialize)]
struct GraphqlErrorEntry {
    #[serde(default)]
    message: String,
    #[serde(default)]
    extensions: GraphqlErrorExtensions,
}

#[derive(Deserialize, Default)]
struct GraphqlErrorExtensions {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    field: Option<String>,
}

/// Blocking Data API client bound to one endpoint and caller identity.
#[derive(Debug, Clone)]
pub struct DataApiClient {
    endpoint: String,
    identity: DataApiIdentity,
    http: reqwest::blocking::Client,
}

impl DataApiClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, DataApiError> {
        Self::with_timeout(endpoint, DEFAULT_DATA_API_TIMEOUT_MS)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout_ms: u64) -> Result<Self, DataApiError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            identity: DataApiIdentity::default(),
            http,
        })
    }

    /// Returns a client that sends `identity` with each request.
    pub fn with_identity(&self, identity: DataApiIdentity) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            identity,
            http: self.http.clone(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn identity(&self) -> &DataApiIdentity {
        &self.identity
    }

    /// Runs one query or mutation and decodes its `data` object into `T`.
    ///
    /// GraphQL errors take precedence over the HTTP status since servers
    /// report them with both 200 and 4xx codes.
    pub fn execute<V, T>(&self, query: &str, variables: &V) -> Result<T, DataApiError>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header(
                "authorization",
                self.identity.id_token.as_deref().unwrap_or("anonymous"),
            )
            .json(&GraphqlRequest { query, variables });
        if let Some(email) = self.identity.email.as_deref() {
            request = request.header("x-user-email", email);
        }
        if let Some(user_pk) = self.identity.user_pk.as_deref() {
            request = request.header("x-user-pk", user_pk);
        }

        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;
        tracing::debug!(
            endpoint = %self.endpoint,
            status = status.as_u16(),
            body_len = body.len(),
            "data api response received"
        );

        let parsed = serde_json::from_str::<GraphqlResponse>(&body);
        if let Ok(envelope) = &parsed {
            if let Some(first) = envelope.errors.first() {
                let kind = DataApiErrorKind::classify(
                    first.extensions.code.as_deref().unwrap_or_default(),
                    first.extensions.field.as_deref(),
                );
                return Err(DataApiError::Query {
                    kind,
                    message: first.message.clone(),
                });
            }
        }
        if !status.is_success() {
            return Err(DataApiError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let data = parsed?
            .data
            .filter(|data| !data.is_null())
            .ok_or_else(|| DataApiError::InvalidResponse("response has no data".to_string()))?;
        Ok(serde_json::from_value(data)?)
    }
}
