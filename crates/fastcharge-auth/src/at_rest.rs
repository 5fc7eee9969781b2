//! Optional keyed encryption of token values inside credential files.

use aes_gcm::{
    aead::{rand_core::RngCore as _, Aead, KeyInit, OsRng, Payload},
    Aes256Gcm,
};
use anyhow::{anyhow, bail, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

const ENCRYPTED_V2_PREFIX: &str = "enc:v2:";
const AES_GCM_NONCE_BYTES: usize = 12;
const AES_GCM_AAD: &[u8] = b"fastcharge-credential-store-v2";
const MIN_STORE_KEY_CHARS: usize = 8;

pub(crate) fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_V2_PREFIX)
}

fn derive_key_material(store_key: &str) -> Result<Zeroizing<[u8; 32]>> {
    let store_key = store_key.trim();
    if store_key.len() < MIN_STORE_KEY_CHARS {
        bail!("credential store key must be at least {MIN_STORE_KEY_CHARS} characters");
    }
    let digest = Sha256::digest(store_key.as_bytes());
    let mut material = Zeroizing::new([0u8; 32]);
    material.copy_from_slice(&digest);
    Ok(material)
}

pub(crate) fn encrypt_value(secret: &str, store_key: &str) -> Result<String> {
    let key_material = derive_key_material(store_key)?;
    let cipher = Aes256Gcm::new_from_slice(key_material.as_slice())
        .map_err(|_| anyhow!("credential key material has invalid length"))?;
    let mut nonce = [0u8; AES_GCM_NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            (&nonce).into(),
            Payload {
                msg: secret.as_bytes(),
                aad: AES_GCM_AAD,
            },
        )
        .map_err(|_| anyhow!("credential payload encryption failed"))?;

    let mut payload = Vec::with_capacity(AES_GCM_NONCE_BYTES + ciphertext.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);
    Ok(format!(
        "{ENCRYPTED_V2_PREFIX}{}",
        BASE64_STANDARD.encode(payload)
    ))
}

pub(crate) fn decrypt_value(encoded: &str, store_key: Option<&str>) -> Result<String> {
    let Some(payload) = encoded.strip_prefix(ENCRYPTED_V2_PREFIX) else {
        return Ok(encoded.to_string());
    };
    let Some(store_key) = store_key else {
        bail!("credential file is encrypted; a credential store key is required");
    };
    let key_material = derive_key_material(store_key)?;
    let cipher = Aes256Gcm::new_from_slice(key_material.as_slice())
        .map_err(|_| anyhow!("credential key material has invalid length"))?;
    let raw = BASE64_STANDARD
        .decode(payload)
        .map_err(|_| anyhow!("credential payload encoding is invalid"))?;
    if raw.len() <= AES_GCM_NONCE_BYTES {
        bail!("credential payload is truncated");
    }

    let (nonce, ciphertext) = raw.split_at(AES_GCM_NONCE_BYTES);
    let plaintext = cipher
        .decrypt(
            nonce.into(),
            Payload {
                msg: ciphertext,
                aad: AES_GCM_AAD,
            },
        )
        .map_err(|_| anyhow!("credential payload integrity check failed"))?;
    String::from_utf8(plaintext).map_err(|_| anyhow!("credential payload is not valid UTF-8"))
}
