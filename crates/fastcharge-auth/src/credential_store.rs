//! Per-profile credential files and the read-or-refresh flow.
//!
//! Each profile maps to one JSON file holding
//! `{id_token, refresh_token, issuer, user_pk, email}`. Writes merge a
//! [`CredentialPatch`] into the stored record, go through a temp file and
//! rename, and leave the file readable by its owner only. When a store key is
//! configured, token values are kept as `enc:v2:` AES-GCM payloads.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use fastcharge_core::write_private_text_atomic;
use fastcharge_dataapi::DataApiError;
use fastcharge_identity::{CertificateFetchError, TokenVerifier};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::{
    at_rest::{decrypt_value, encrypt_value},
    profile::Profile,
    refresh::{RefreshError, TokenRefresher},
    user_directory::UserDirectory,
};

pub const CREDENTIAL_DIR_NAME: &str = ".fastcharge";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("invalid profile name '{0}'")]
    InvalidProfile(String),
    #[error("stored credentials for profile '{0}' are incomplete")]
    Incomplete(Profile),
    #[error("credential file {} is unreadable; log in again to replace it", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("identity certificates are unavailable: {0}")]
    Certificates(#[source] CertificateFetchError),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error("user lookup failed: {0}")]
    UserLookup(#[source] DataApiError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Who issued the stored id token, and so how it is kept fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CredentialIssuer {
    /// Verified locally against the identity provider's certificates.
    #[default]
    #[serde(rename = "firebase")]
    IdentityProvider,
    /// Trusted as-is; only refreshed on demand through the backend.
    #[serde(rename = "fastchargeapi")]
    Backend,
}

impl CredentialIssuer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IdentityProvider => "firebase",
            Self::Backend => "fastchargeapi",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Default)]
pub struct CredentialRecord {
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub issuer: CredentialIssuer,
    pub user_pk: Option<String>,
    pub email: Option<String>,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("CredentialRecord")
            .field("id_token", &redact(&self.id_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("issuer", &self.issuer)
            .field("user_pk", &self.user_pk)
            .field("email", &self.email)
            .finish()
    }
}

impl CredentialRecord {
    pub fn id_token(&self) -> Option<&str> {
        non_empty(self.id_token.as_deref())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        non_empty(self.refresh_token.as_deref())
    }

    /// Backend-issued records may legitimately carry no refresh token.
    pub fn is_complete(&self) -> bool {
        match self.issuer {
            CredentialIssuer::IdentityProvider => {
                self.id_token().is_some() && self.refresh_token().is_some()
            }
            CredentialIssuer::Backend => self.id_token().is_some(),
        }
    }

    fn apply(&mut self, patch: CredentialPatch) {
        let CredentialPatch {
            id_token,
            refresh_token,
            issuer,
            user_pk,
            email,
        } = patch;
        if id_token.is_some() {
            self.id_token = id_token;
        }
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
        if let Some(issuer) = issuer {
            self.issuer = issuer;
        }
        if user_pk.is_some() {
            self.user_pk = user_pk;
        }
        if email.is_some() {
            self.email = email;
        }
    }
}

fn ensure_certificates(verifier: &TokenVerifier) -> Result<(), CredentialError> {
    verifier
        .cache()
        .certificates()
        .map(|_| ())
        .map_err(CredentialError::Certificates)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

/// Partial update; `None` fields keep their stored value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialPatch {
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub issuer: Option<CredentialIssuer>,
    pub user_pk: Option<String>,
    pub email: Option<String>,
}

impl fmt::Debug for CredentialPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPatch")
            .field("id_token", &self.id_token.is_some())
            .field("refresh_token", &self.refresh_token.is_some())
            .field("issuer", &self.issuer)
            .field("user_pk", &self.user_pk)
            .field("email", &self.email)
            .finish()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCredentialFile {
    #[serde(default, alias = "idToken", skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
    #[serde(default, alias = "refreshToken", skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default)]
    issuer: Option<CredentialIssuer>,
    #[serde(default, alias = "userPK", skip_serializing_if = "Option::is_none")]
    user_pk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

/// Collaborators needed to refresh a stale record.
pub struct CredentialRefresh<'a> {
    pub verifier: &'a TokenVerifier,
    pub identity_provider: &'a dyn TokenRefresher,
    pub backend: Option<&'a dyn TokenRefresher>,
    pub users: &'a dyn UserDirectory,
}

/// File-backed credential store rooted at a directory (default `~/.fastcharge`).
#[derive(Clone)]
pub struct CredentialStore {
    root: PathBuf,
    store_key: Option<Zeroizing<String>>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("root", &self.root)
            .field("encrypted", &self.store_key.is_some())
            .finish()
    }
}

impl CredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            store_key: None,
        }
    }

    pub fn default_root() -> Result<PathBuf, CredentialError> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("unable to resolve home directory"))?;
        Ok(home.join(CREDENTIAL_DIR_NAME))
    }

    /// Encrypts token values at rest with `store_key`; `None` keeps plaintext.
    pub fn with_store_key(mut self, store_key: Option<String>) -> Self {
        self.store_key = store_key
            .filter(|key| !key.trim().is_empty())
            .map(Zeroizing::new);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, profile: &Profile) -> PathBuf {
        self.root.join(profile.file_name())
    }

    pub fn read(&self, profile: &Profile) -> Result<Option<CredentialRecord>, CredentialError> {
        let path = self.path_for(profile);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(anyhow::Error::new(error)
                    .context(format!("failed to read {}", path.display()))
                    .into())
            }
        };
        let stored: StoredCredentialFile = serde_json::from_str(&raw)
            .map_err(|source| CredentialError::Unreadable { path, source })?;
        Ok(Some(self.decode(stored)?))
    }

    /// Merges `patch` into the stored record (or an empty one) and persists it.
    ///
    /// An unreadable file is replaced rather than merged.
    pub fn write(
        &self,
        profile: &Profile,
        patch: CredentialPatch,
    ) -> Result<CredentialRecord, CredentialError> {
        let mut record = match self.read(profile) {
            Ok(record) => record.unwrap_or_default(),
            Err(CredentialError::Unreadable { path, source }) => {
                tracing::warn!(path = %path.display(), error = %source, "replacing unreadable credential file");
                CredentialRecord::default()
            }
            Err(error) => return Err(error),
        };
        record.apply(patch);
        self.persist(profile, record)
    }

    fn persist(
        &self,
        profile: &Profile,
        record: CredentialRecord,
    ) -> Result<CredentialRecord, CredentialError> {
        let path = self.path_for(profile);
        let encoded = serde_json::to_string_pretty(&self.encode(&record)?)
            .context("failed to serialize credential record")?;
        write_private_text_atomic(&path, &encoded)?;
        tracing::debug!(
            profile = %profile,
            issuer = record.issuer.as_str(),
            encrypted = self.store_key.is_some(),
            "credential record written"
        );
        Ok(record)
    }

    /// Removes the profile's file. Returns whether one existed.
    pub fn delete(&self, profile: &Profile) -> Result<bool, CredentialError> {
        let path = self.path_for(profile);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(anyhow::Error::new(error)
                .context(format!("failed to remove {}", path.display()))
                .into()),
        }
    }

    /// Profiles with a credential file, default first, then by name.
    pub fn list_profiles(&self) -> Result<Vec<Profile>, CredentialError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(anyhow::Error::new(error)
                    .context(format!("failed to list {}", self.root.display()))
                    .into())
            }
        };
        let mut profiles = Vec::new();
        for entry in entries {
            let entry = entry
                .with_context(|| format!("failed to list {}", self.root.display()))?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(profile) = entry.file_name().to_str().and_then(Profile::from_file_name) {
                profiles.push(profile);
            }
        }
        profiles.sort();
        Ok(profiles)
    }

    /// Returns the stored record, refreshing it first when it is stale or `force` is set.
    ///
    /// Identity-provider tokens are verified locally; a valid token is
    /// returned untouched. Backend-issued tokens are trusted and only
    /// refreshed when forced.
    ///
    /// A valid record missing its user pk gets it looked up and stored.
    ///
    /// # Panics
    ///
    /// Panics if a freshly refreshed identity-provider token fails verification
    /// while the certificate set is available.
    pub fn read_or_refresh(
        &self,
        profile: &Profile,
        force: bool,
        deps: &CredentialRefresh<'_>,
    ) -> Result<Option<CredentialRecord>, CredentialError> {
        let Some(record) = self.read(profile)? else {
            return Ok(None);
        };
        if !record.is_complete() {
            return Err(CredentialError::Incomplete(profile.clone()));
        }

        match record.issuer {
            CredentialIssuer::IdentityProvider => {
                self.refresh_identity_provider_record(profile, record, force, deps)
            }
            CredentialIssuer::Backend => {
                if !force {
                    return Ok(Some(record));
                }
                let backend = deps.backend.ok_or(RefreshError::NotConfigured)?;
                let refresh_token = record
                    .refresh_token()
                    .ok_or(RefreshError::MissingRefreshToken)?;
                let refreshed = backend.refresh(refresh_token)?;
                let updated = self.write(
                    profile,
                    CredentialPatch {
                        id_token: Some(refreshed.id_token.clone()),
                        refresh_token: Some(refreshed.refresh_token.clone()),
                        ..CredentialPatch::default()
                    },
                )?;
                tracing::debug!(profile = %profile, "backend token refreshed");
                Ok(Some(updated))
            }
        }
    }

    fn refresh_identity_provider_record(
        &self,
        profile: &Profile,
        record: CredentialRecord,
        force: bool,
        deps: &CredentialRefresh<'_>,
    ) -> Result<Option<CredentialRecord>, CredentialError> {
        let (Some(id_token), Some(refresh_token)) = (record.id_token(), record.refresh_token())
        else {
            return Err(CredentialError::Incomplete(profile.clone()));
        };
        ensure_certificates(deps.verifier)?;
        if !force {
            if let Ok(identity) = deps.verifier.verify(id_token) {
                if record.user_pk.is_some() {
                    return Ok(Some(record));
                }
                let id_token = id_token.to_string();
                return self
                    .store_user_pk(profile, record, &identity.email, &id_token, deps)
                    .map(Some);
            }
        }

        let refreshed = deps.identity_provider.refresh(refresh_token)?;
        ensure_certificates(deps.verifier)?;
        let Ok(identity) = deps.verifier.verify(&refreshed.id_token) else {
            panic!("identity provider refreshed an id token that fails verification");
        };

        let same_user = record.email.as_deref() == Some(identity.email.as_str());
        let updated = self.persist(
            profile,
            CredentialRecord {
                id_token: Some(refreshed.id_token.clone()),
                refresh_token: Some(refreshed.refresh_token),
                issuer: CredentialIssuer::IdentityProvider,
                user_pk: record.user_pk.filter(|_| same_user),
                email: Some(identity.email.clone()),
            },
        )?;
        tracing::debug!(profile = %profile, forced = force, "id token refreshed");
        if updated.user_pk.is_some() {
            return Ok(Some(updated));
        }
        self.store_user_pk(profile, updated, &identity.email, &refreshed.id_token, deps)
            .map(Some)
    }

    fn store_user_pk(
        &self,
        profile: &Profile,
        mut record: CredentialRecord,
        email: &str,
        id_token: &str,
        deps: &CredentialRefresh<'_>,
    ) -> Result<CredentialRecord, CredentialError> {
        let user_pk = deps
            .users
            .user_pk_by_email(email, id_token)
            .map_err(CredentialError::UserLookup)?;
        record.user_pk = Some(user_pk);
        record.email = Some(email.to_string());
        self.persist(profile, record)
    }

    fn encode(&self, record: &CredentialRecord) -> Result<StoredCredentialFile, CredentialError> {
        let protect = |value: &Option<String>| -> Result<Option<String>, CredentialError> {
            match (value, self.store_key.as_deref()) {
                (Some(value), Some(store_key)) if !value.is_empty() => {
                    Ok(Some(encrypt_value(value, store_key)?))
                }
                (value, _) => Ok(value.clone()),
            }
        };
        Ok(StoredCredentialFile {
            id_token: protect(&record.id_token)?,
            refresh_token: protect(&record.refresh_token)?,
            issuer: Some(record.issuer),
            user_pk: record.user_pk.clone(),
            email: record.email.clone(),
        })
    }

    fn decode(&self, stored: StoredCredentialFile) -> Result<CredentialRecord, CredentialError> {
        let store_key = self.store_key.as_deref().map(String::as_str);
        let reveal = |value: Option<String>| -> Result<Option<String>, CredentialError> {
            value
                .map(|value| decrypt_value(&value, store_key))
                .transpose()
                .map_err(CredentialError::from)
        };
        Ok(CredentialRecord {
            id_token: reveal(stored.id_token)?,
            refresh_token: reveal(stored.refresh_token)?,
            issuer: stored.issuer.unwrap_or_default(),
            user_pk: stored.user_pk,
            email: stored.email,
        })
    }
}
