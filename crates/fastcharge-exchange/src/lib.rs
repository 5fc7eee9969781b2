//! Browser-to-CLI credential hand-off over an untrusted secret store.
//!
//! The CLI generates one-time [`SecretExchangeKeyMaterial`], passes it to the
//! browser login page in the URL, and polls a [`RemoteSecretStore`] until the
//! page deposits a value sealed with [`envelope::seal`]. The store only ever
//! sees ciphertext.

pub mod envelope;
mod key_material;
mod remote_store;
mod session;

pub use envelope::{open, open_json, seal, seal_json, EnvelopeError};
pub use key_material::{EnvelopeKeys, SecretExchangeKeyMaterial, ENVELOPE_SECRET_BYTES};
pub use remote_store::{
    open_remote_store, DataApiSecretStore, MemorySecretStore, ObjectStorageSecretStore,
    RemoteSecretStore, RemoteStoreBackend, RemoteStoreError, DEFAULT_SECRET_BUCKET_URL,
};
pub use session::{
    ExchangeError, ExchangeState, OperatorPrompt, PollHandle, PollSleeper, SecretExchangeConfig,
    SecretExchangeSession, StdinPrompt, ThreadSleeper, DEFAULT_POLL_INTERVAL,
    DEFAULT_POLL_MAX_COUNT, DEFAULT_TIMEOUT_PROMPT, MAX_POLL_MAX_COUNT, MIN_POLL_INTERVAL,
};
