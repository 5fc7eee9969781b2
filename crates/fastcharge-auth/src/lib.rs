//! Credential persistence and the login/logout/status façade.
//!
//! [`CredentialStore`] keeps one JSON record per profile under
//! `~/.fastcharge`, merge-writes updates, and refreshes stale id tokens on
//! read. [`AuthSession`] wires the store to the token verifier, refresh
//! endpoints, user directory, and the browser secret exchange.

mod at_rest;
mod auth_session;
mod credential_store;
mod profile;
mod refresh;
mod user_directory;

pub use auth_session::{
    AuthSession, AuthSessionDeps, AuthSessionError, CredentialState, LoginOutcome, ProfileStatus,
};
pub use credential_store::{
    CredentialError, CredentialIssuer, CredentialPatch, CredentialRecord, CredentialRefresh,
    CredentialStore, CREDENTIAL_DIR_NAME,
};
pub use profile::Profile;
pub use refresh::{
    HttpTokenRefresher, RefreshError, RefreshedTokens, TokenRefresher, REFRESH_ID_TOKEN_PATH,
};
pub use user_directory::{DataApiUserDirectory, UserDirectory};
