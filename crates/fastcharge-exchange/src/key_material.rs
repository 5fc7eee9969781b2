use std::fmt;

use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::envelope::EnvelopeError;

/// Size of each envelope secret (512 bits).
pub const ENVELOPE_SECRET_BYTES: usize = 64;
const EXCHANGE_KEY_BYTES: usize = 16;

/// The encryption and signing secrets for one envelope.
#[derive(Clone, PartialEq, Eq)]
pub struct EnvelopeKeys {
    jwe_secret: Zeroizing<Vec<u8>>,
    jwt_secret: Zeroizing<Vec<u8>>,
}

impl EnvelopeKeys {
    pub fn new(jwe_secret: Vec<u8>, jwt_secret: Vec<u8>) -> Result<Self, EnvelopeError> {
        let jwe_secret = Zeroizing::new(jwe_secret);
        let jwt_secret = Zeroizing::new(jwt_secret);
        if jwe_secret.len() != ENVELOPE_SECRET_BYTES || jwt_secret.len() != ENVELOPE_SECRET_BYTES {
            return Err(EnvelopeError::InvalidKey);
        }
        Ok(Self {
            jwe_secret,
            jwt_secret,
        })
    }

    pub fn generate() -> Self {
        Self {
            jwe_secret: random_secret(ENVELOPE_SECRET_BYTES),
            jwt_secret: random_secret(ENVELOPE_SECRET_BYTES),
        }
    }

    /// Parses the hex encoding used in the login URL.
    pub fn from_hex(jwe_hex: &str, jwt_hex: &str) -> Result<Self, EnvelopeError> {
        let jwe_secret = hex::decode(jwe_hex.trim()).map_err(|_| EnvelopeError::InvalidKey)?;
        let jwt_secret = hex::decode(jwt_hex.trim()).map_err(|_| EnvelopeError::InvalidKey)?;
        Self::new(jwe_secret, jwt_secret)
    }

    pub fn jwe_secret(&self) -> &[u8] {
        &self.jwe_secret
    }

    pub fn jwt_secret(&self) -> &[u8] {
        &self.jwt_secret
    }

    pub fn jwe_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.jwe_secret.as_slice()))
    }

    pub fn jwt_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.jwt_secret.as_slice()))
    }
}

impl fmt::Debug for EnvelopeKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnvelopeKeys([REDACTED])")
    }
}

/// One-time secrets for a single login attempt. Never persisted.
#[derive(Clone)]
pub struct SecretExchangeKeyMaterial {
    keys: EnvelopeKeys,
    exchange_key: String,
}

impl SecretExchangeKeyMaterial {
    pub fn generate() -> Self {
        let mut key_bytes = [0u8; EXCHANGE_KEY_BYTES];
        OsRng.fill_bytes(&mut key_bytes);
        Self {
            keys: EnvelopeKeys::generate(),
            exchange_key: hex::encode(key_bytes),
        }
    }

    pub fn from_parts(keys: EnvelopeKeys, exchange_key: impl Into<String>) -> Self {
        Self {
            keys,
            exchange_key: exchange_key.into(),
        }
    }

    pub fn keys(&self) -> &EnvelopeKeys {
        &self.keys
    }

    /// Store key under which the browser deposits the sealed value.
    pub fn exchange_key(&self) -> &str {
        &self.exchange_key
    }
}

impl fmt::Debug for SecretExchangeKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretExchangeKeyMaterial")
            .field("keys", &self.keys)
            .field("exchange_key", &self.exchange_key)
            .finish()
    }
}

fn random_secret(len: usize) -> Zeroizing<Vec<u8>> {
    let mut secret = Zeroizing::new(vec![0u8; len]);
    OsRng.fill_bytes(secret.as_mut_slice());
    secret
}
