use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use fastcharge_dataapi::{DataApiClient, DataApiError, DataApiErrorKind};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

pub const DEFAULT_SECRET_BUCKET_URL: &str = "https://cli-auth-bucket.s3.amazonaws.com";
const OBJECT_STORAGE_TIMEOUT: Duration = Duration::from_secs(15);

const GET_SECRET_QUERY: &str = "query GetSecret($key: String!) { getSecret(key: $key) { value deleteSecret { key } } }";
const PUT_SECRET_MUTATION: &str = "mutation PutSecret($key: String!, $value: String!, $description: String, $expireAt: Timestamp) { createSecret(key: $key, value: $value, description: $description, expireAt: $expireAt) { createdAt } }";

#[derive(Debug, Error)]
pub enum RemoteStoreError {
    /// Network-level failure. Pollers treat this as "not yet available".
    #[error("secret store unreachable: {0}")]
    Transport(String),
    #[error("secret store protocol error: {0}")]
    Protocol(String),
}

impl RemoteStoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<DataApiError> for RemoteStoreError {
    fn from(error: DataApiError) -> Self {
        if error.is_transient() {
            Self::Transport(error.to_string())
        } else {
            Self::Protocol(error.to_string())
        }
    }
}

/// Single-reader key/value store the browser writes sealed secrets into.
pub trait RemoteSecretStore: Send + Sync {
    /// Returns the value at `key` and removes it, or `None` if nothing is there yet.
    fn get(&self, key: &str) -> Result<Option<String>, RemoteStoreError>;

    fn put(&self, key: &str, value: &str) -> Result<(), RemoteStoreError>;

    fn backend(&self) -> RemoteStoreBackend;
}

/// Which transport carries the sealed secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteStoreBackend {
    #[default]
    DataApi,
    ObjectStorage,
    Memory,
}

impl RemoteStoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DataApi => "data-api",
            Self::ObjectStorage => "object-storage",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for RemoteStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the store for `backend`.
pub fn open_remote_store(
    backend: RemoteStoreBackend,
    data_api: &DataApiClient,
    bucket_url: &str,
) -> Result<Arc<dyn RemoteSecretStore>, RemoteStoreError> {
    Ok(match backend {
        RemoteStoreBackend::DataApi => Arc::new(DataApiSecretStore::new(data_api.clone())),
        RemoteStoreBackend::ObjectStorage => Arc::new(ObjectStorageSecretStore::new(bucket_url)?),
        RemoteStoreBackend::Memory => Arc::new(MemorySecretStore::default()),
    })
}

/// Anonymous object-storage bucket: `GET` then `DELETE` on `{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct ObjectStorageSecretStore {
    bucket_url: String,
    http: reqwest::blocking::Client,
}

impl ObjectStorageSecretStore {
    pub fn new(bucket_url: &str) -> Result<Self, RemoteStoreError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(OBJECT_STORAGE_TIMEOUT)
            .build()
            .map_err(|error| RemoteStoreError::Protocol(format!("http client: {error}")))?;
        Ok(Self {
            bucket_url: bucket_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{key}", self.bucket_url)
    }
}

fn transport(error: reqwest::Error) -> RemoteStoreError {
    RemoteStoreError::Transport(error.to_string())
}

impl RemoteSecretStore for ObjectStorageSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, RemoteStoreError> {
        let url = self.object_url(key);
        let response = self.http.get(&url).send().map_err(transport)?;
        let status = response.status();
        // Anonymous reads of a missing object answer 403, not 404.
        if status.as_u16() == 404 || status.as_u16() == 403 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RemoteStoreError::Protocol(format!(
                "object storage returned status {}",
                status.as_u16()
            )));
        }
        let value = response.text().map_err(transport)?;

        match self.http.delete(&url).send() {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => tracing::warn!(
                status = response.status().as_u16(),
                "failed to delete delivered secret object"
            ),
            Err(error) => tracing::warn!(error = %error, "failed to delete delivered secret object"),
        }
        Ok(Some(value))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), RemoteStoreError> {
        let response = self
            .http
            .put(self.object_url(key))
            .body(value.to_string())
            .send()
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(RemoteStoreError::Protocol(format!(
                "object storage rejected write with status {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }

    fn backend(&self) -> RemoteStoreBackend {
        RemoteStoreBackend::ObjectStorage
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetSecretData {
    get_secret: Option<SecretNode>,
}

#[derive(Deserialize)]
struct SecretNode {
    value: String,
}

/// Data API secret store. One query reads the value and deletes it server-side.
#[derive(Debug, Clone)]
pub struct DataApiSecretStore {
    client: DataApiClient,
    description: Option<String>,
    expire_after: Option<Duration>,
}

impl DataApiSecretStore {
    pub fn new(client: DataApiClient) -> Self {
        Self {
            client,
            description: None,
            expire_after: None,
        }
    }

    /// Sets the description and lifetime attached to values written with `put`.
    pub fn with_put_options(mut self, description: Option<String>, expire_after: Option<Duration>) -> Self {
        self.description = description;
        self.expire_after = expire_after;
        self
    }
}

impl RemoteSecretStore for DataApiSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, RemoteStoreError> {
        match self
            .client
            .execute::<_, GetSecretData>(GET_SECRET_QUERY, &json!({ "key": key }))
        {
            Ok(data) => Ok(data.get_secret.map(|secret| secret.value)),
            Err(DataApiError::Query {
                kind: DataApiErrorKind::NotFound,
                ..
            }) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), RemoteStoreError> {
        let expire_at = self.expire_after.map(|lifetime| {
            fastcharge_core::current_unix_timestamp_ms()
                .saturating_add(u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX))
        });
        self.client.execute::<_, serde_json::Value>(
            PUT_SECRET_MUTATION,
            &json!({
                "key": key,
                "value": value,
                "description": self.description,
                "expireAt": expire_at,
            }),
        )?;
        Ok(())
    }

    fn backend(&self) -> RemoteStoreBackend {
        RemoteStoreBackend::DataApi
    }
}

/// Process-local store with the same take-once semantics.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemorySecretStore {
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RemoteSecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, RemoteStoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), RemoteStoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(key) {
            return Err(RemoteStoreError::Protocol(format!(
                "secret '{key}' already exists"
            )));
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn backend(&self) -> RemoteStoreBackend {
        RemoteStoreBackend::Memory
    }
}
