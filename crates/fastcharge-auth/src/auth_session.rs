use std::sync::Arc;

use fastcharge_dataapi::DataApiError;
use fastcharge_exchange::{
    ExchangeError, OperatorPrompt, PollSleeper, RemoteSecretStore, SecretExchangeConfig,
    SecretExchangeSession,
};
use fastcharge_identity::TokenVerifier;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::{
    credential_store::{
        CredentialError, CredentialIssuer, CredentialPatch, CredentialRecord, CredentialRefresh,
        CredentialStore,
    },
    profile::Profile,
    refresh::TokenRefresher,
    user_directory::UserDirectory,
};

#[derive(Debug, Error)]
pub enum AuthSessionError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error("user lookup failed: {0}")]
    UserLookup(#[source] DataApiError),
}

/// Everything an [`AuthSession`] needs, assembled once at startup.
pub struct AuthSessionDeps {
    pub store: CredentialStore,
    pub verifier: Arc<TokenVerifier>,
    pub identity_provider: Arc<dyn TokenRefresher>,
    pub backend: Option<Arc<dyn TokenRefresher>>,
    pub users: Arc<dyn UserDirectory>,
    pub secret_store: Arc<dyn RemoteSecretStore>,
    pub exchange: SecretExchangeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    AlreadyLoggedIn(CredentialRecord),
    LoggedIn(CredentialRecord),
}

impl LoginOutcome {
    pub fn record(&self) -> &CredentialRecord {
        match self {
            Self::AlreadyLoggedIn(record) | Self::LoggedIn(record) => record,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Id token verifies right now.
    Valid,
    /// Expired or otherwise stale; the next `current` call refreshes it.
    NeedsRefresh,
    /// Missing tokens; a new login is required.
    Incomplete,
    /// Backend-issued token, not verifiable locally.
    Unverified,
}

impl CredentialState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::NeedsRefresh => "needs-refresh",
            Self::Incomplete => "incomplete",
            Self::Unverified => "unverified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileStatus {
    pub profile: Profile,
    pub email: Option<String>,
    pub issuer: CredentialIssuer,
    pub state: CredentialState,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliveredTokens {
    id_token: String,
    refresh_token: String,
}

pub struct AuthSession {
    deps: AuthSessionDeps,
    poll_sleeper: Option<Arc<dyn PollSleeper>>,
    operator_prompt: Option<Arc<dyn OperatorPrompt>>,
}

impl AuthSession {
    pub fn new(deps: AuthSessionDeps) -> Self {
        Self {
            deps,
            poll_sleeper: None,
            operator_prompt: None,
        }
    }

    pub fn with_poll_sleeper(mut self, sleeper: Arc<dyn PollSleeper>) -> Self {
        self.poll_sleeper = Some(sleeper);
        self
    }

    pub fn with_operator_prompt(mut self, prompt: Arc<dyn OperatorPrompt>) -> Self {
        self.operator_prompt = Some(prompt);
        self
    }

    pub fn store(&self) -> &CredentialStore {
        &self.deps.store
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.deps.verifier
    }

    fn refresh_deps(&self) -> CredentialRefresh<'_> {
        CredentialRefresh {
            verifier: &self.deps.verifier,
            identity_provider: self.deps.identity_provider.as_ref(),
            backend: self.deps.backend.as_deref(),
            users: self.deps.users.as_ref(),
        }
    }

    /// Current credentials for `profile`, refreshed if stale.
    ///
    /// `None` means a login is required.
    pub fn current(
        &self,
        profile: &Profile,
        force: bool,
    ) -> Result<Option<CredentialRecord>, AuthSessionError> {
        match self
            .deps
            .store
            .read_or_refresh(profile, force, &self.refresh_deps())
        {
            Ok(record) => Ok(record),
            Err(CredentialError::Incomplete(_)) => Ok(None),
            Err(error @ CredentialError::Unreadable { .. }) => {
                tracing::warn!(profile = %profile, error = %error, "stored credentials are unreadable");
                Ok(None)
            }
            Err(CredentialError::Refresh(error)) => {
                tracing::debug!(profile = %profile, error = %error, "stored credentials could not be refreshed");
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Logs in through the browser hand-off unless valid credentials exist.
    ///
    /// `launch` receives the login URL, which carries the one-time secrets.
    pub fn login(
        &self,
        profile: &Profile,
        launch: impl FnOnce(&Url),
    ) -> Result<LoginOutcome, AuthSessionError> {
        if let Some(record) = self.current(profile, false)? {
            return Ok(LoginOutcome::AlreadyLoggedIn(record));
        }

        let mut handle = SecretExchangeSession::begin(
            self.deps.exchange.clone(),
            Arc::clone(&self.deps.secret_store),
            launch,
        )?;
        if let Some(sleeper) = &self.poll_sleeper {
            handle = handle.with_sleeper(Arc::clone(sleeper));
        }
        if let Some(prompt) = &self.operator_prompt {
            handle = handle.with_prompt(Arc::clone(prompt));
        }
        let delivered: DeliveredTokens = handle.read_json()?;

        let identity = self
            .deps
            .verifier
            .verify(&delivered.id_token)
            .map_err(|_| AuthSessionError::LoginFailed("received id token is invalid".to_string()))?;
        let user_pk = self
            .deps
            .users
            .user_pk_by_email(&identity.email, &delivered.id_token)
            .map_err(AuthSessionError::UserLookup)?;

        let record = self.deps.store.write(
            profile,
            CredentialPatch {
                id_token: Some(delivered.id_token),
                refresh_token: Some(delivered.refresh_token),
                issuer: Some(CredentialIssuer::IdentityProvider),
                user_pk: Some(user_pk),
                email: Some(identity.email),
            },
        )?;
        tracing::debug!(profile = %profile, "login completed");
        Ok(LoginOutcome::LoggedIn(record))
    }

    /// Deletes one profile, or every profile when `profile` is `None`.
    pub fn logout(&self, profile: Option<&Profile>) -> Result<Vec<Profile>, AuthSessionError> {
        let targets = match profile {
            Some(profile) => vec![profile.clone()],
            None => self.deps.store.list_profiles()?,
        };
        let mut removed = Vec::new();
        for target in targets {
            if self.deps.store.delete(&target)? {
                removed.push(target);
            }
        }
        tracing::debug!(removed = removed.len(), "logout completed");
        Ok(removed)
    }

    /// Stored profiles and their state. Never refreshes or writes.
    pub fn status(&self) -> Result<Vec<ProfileStatus>, AuthSessionError> {
        let mut statuses = Vec::new();
        for profile in self.deps.store.list_profiles()? {
            let record = match self.deps.store.read(&profile) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(CredentialError::Unreadable { .. }) => {
                    statuses.push(ProfileStatus {
                        profile,
                        email: None,
                        issuer: CredentialIssuer::default(),
                        state: CredentialState::Incomplete,
                    });
                    continue;
                }
                Err(error) => return Err(error.into()),
            };
            let state = if !record.is_complete() {
                CredentialState::Incomplete
            } else {
                match (record.issuer, record.id_token()) {
                    (CredentialIssuer::Backend, _) => CredentialState::Unverified,
                    (CredentialIssuer::IdentityProvider, Some(token))
                        if self.deps.verifier.verify(token).is_ok() =>
                    {
                        CredentialState::Valid
                    }
                    (CredentialIssuer::IdentityProvider, _) => CredentialState::NeedsRefresh,
                }
            };
            statuses.push(ProfileStatus {
                profile,
                email: record.email.clone(),
                issuer: record.issuer,
                state,
            });
        }
        Ok(statuses)
    }
}
