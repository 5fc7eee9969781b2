//! Sealed envelope: a compact JWE (`dir` + `A256CBC-HS512`) wrapped in an
//! HS512-signed JWT whose only claim is `{"encrypted": <jwe>}`.
//!
//! The format matches what browser `jose` produces with `EncryptJWT` and
//! `SignJWT`, so either side may seal and the other open. Opening checks the
//! outer MAC before the inner JWE is parsed.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha512;
use thiserror::Error;

use crate::key_material::EnvelopeKeys;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha512 = Hmac<Sha512>;

const JWE_ALG: &str = "dir";
const JWE_ENC: &str = "A256CBC-HS512";
const CBC_HS512_HALF_KEY_BYTES: usize = 32;
const CBC_IV_BYTES: usize = 16;
const CBC_HS512_TAG_BYTES: usize = 32;
const ENVELOPE_CLAIM_AUDIENCE: &str = "fastchargeapi.com";
const ENVELOPE_CLAIM_ISSUER: &str = "fastchargeapi.com";

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope signature is invalid")]
    SignatureInvalid,
    #[error("envelope is malformed: {0}")]
    Malformed(String),
    #[error("envelope decryption failed")]
    DecryptionFailed,
    #[error("envelope secret has invalid length or encoding")]
    InvalidKey,
    #[error("envelope payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct OuterClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct JweHeader {
    alg: String,
    enc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    zip: Option<String>,
}

/// Encrypts `plaintext` under the JWE secret, then signs the result under the JWT secret.
pub fn seal(plaintext: &[u8], keys: &EnvelopeKeys) -> Result<String, EnvelopeError> {
    let encrypted = encrypt_compact(plaintext, keys.jwe_secret())?;
    let claims = OuterClaims {
        encrypted: Some(encrypted),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS512),
        &claims,
        &EncodingKey::from_secret(keys.jwt_secret()),
    )
    .map_err(|error| EnvelopeError::Malformed(format!("failed to sign envelope: {error}")))
}

/// Verifies the outer signature, then decrypts the inner JWE.
pub fn open(blob: &str, keys: &EnvelopeKeys) -> Result<Vec<u8>, EnvelopeError> {
    let mut validation = Validation::new(Algorithm::HS512);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_aud = false;

    let claims = jsonwebtoken::decode::<OuterClaims>(
        blob.trim(),
        &DecodingKey::from_secret(keys.jwt_secret()),
        &validation,
    )
    .map_err(|error| {
        tracing::debug!(error = %error, "envelope signature rejected");
        EnvelopeError::SignatureInvalid
    })?
    .claims;
    let encrypted = claims
        .encrypted
        .ok_or_else(|| EnvelopeError::Malformed("missing encrypted claim".to_string()))?;
    decrypt_compact(&encrypted, keys.jwe_secret())
}

/// Seals a JSON object, stamping `iat`, `iss`, and `aud` like a browser-side `EncryptJWT`.
pub fn seal_json<T: Serialize>(value: &T, keys: &EnvelopeKeys) -> Result<String, EnvelopeError> {
    let mut payload = serde_json::to_value(value)?;
    if let Value::Object(claims) = &mut payload {
        claims
            .entry("iat")
            .or_insert_with(|| json!(fastcharge_core::current_unix_timestamp()));
        claims
            .entry("iss")
            .or_insert_with(|| json!(ENVELOPE_CLAIM_ISSUER));
        claims
            .entry("aud")
            .or_insert_with(|| json!(ENVELOPE_CLAIM_AUDIENCE));
    }
    seal(&serde_json::to_vec(&payload)?, keys)
}

/// Opens a JSON envelope, dropping the `iat`, `iss`, and `aud` claims that sealing stamps.
pub fn open_json<T: DeserializeOwned>(blob: &str, keys: &EnvelopeKeys) -> Result<T, EnvelopeError> {
    decode_json_payload(&open(blob, keys)?)
}

pub(crate) fn decode_json_payload<T: DeserializeOwned>(plaintext: &[u8]) -> Result<T, EnvelopeError> {
    let mut payload: Value = serde_json::from_slice(plaintext)?;
    if let Value::Object(claims) = &mut payload {
        for (name, expected) in [
            ("iss", ENVELOPE_CLAIM_ISSUER),
            ("aud", ENVELOPE_CLAIM_AUDIENCE),
        ] {
            match claims.remove(name) {
                None => {}
                Some(Value::String(value)) if value == expected => {}
                Some(_) => {
                    return Err(EnvelopeError::Malformed(format!("unexpected {name} claim")));
                }
            }
        }
        claims.remove("iat");
    }
    Ok(serde_json::from_value(payload)?)
}

fn encrypt_compact(plaintext: &[u8], key: &[u8]) -> Result<String, EnvelopeError> {
    let (mac_key, enc_key) = split_cbc_hs512_key(key)?;
    let header = serde_json::to_vec(&JweHeader {
        alg: JWE_ALG.to_string(),
        enc: JWE_ENC.to_string(),
        zip: None,
    })?;
    let protected = URL_SAFE_NO_PAD.encode(header);

    let mut iv = [0u8; CBC_IV_BYTES];
    OsRng.fill_bytes(&mut iv);
    let ciphertext = Aes256CbcEnc::new_from_slices(enc_key, &iv)
        .map_err(|_| EnvelopeError::InvalidKey)?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let tag = authentication_mac(mac_key, protected.as_bytes(), &iv, &ciphertext)?
        .finalize()
        .into_bytes();

    Ok(format!(
        "{protected}..{}.{}.{}",
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(&ciphertext),
        URL_SAFE_NO_PAD.encode(&tag[..CBC_HS512_TAG_BYTES])
    ))
}

fn decrypt_compact(compact: &str, key: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let (mac_key, enc_key) = split_cbc_hs512_key(key)?;
    let segments = compact.split('.').collect::<Vec<_>>();
    let [protected, encrypted_key, iv, ciphertext, tag] = segments.as_slice() else {
        return Err(EnvelopeError::Malformed(format!(
            "expected 5 JWE segments, found {}",
            segments.len()
        )));
    };
    if !encrypted_key.is_empty() {
        return Err(EnvelopeError::Malformed(
            "direct encryption must not carry an encrypted key".to_string(),
        ));
    }

    let header: JweHeader = serde_json::from_slice(&decode_segment(protected, "header")?)?;
    if header.alg != JWE_ALG || header.enc != JWE_ENC {
        return Err(EnvelopeError::Malformed(format!(
            "unsupported JWE algorithm {}/{}",
            header.alg, header.enc
        )));
    }
    if header.zip.is_some() {
        return Err(EnvelopeError::Malformed(
            "compressed JWE payloads are not supported".to_string(),
        ));
    }

    let iv = decode_segment(iv, "iv")?;
    let ciphertext = decode_segment(ciphertext, "ciphertext")?;
    let tag = decode_segment(tag, "tag")?;
    if iv.len() != CBC_IV_BYTES || tag.len() != CBC_HS512_TAG_BYTES {
        return Err(EnvelopeError::DecryptionFailed);
    }

    authentication_mac(mac_key, protected.as_bytes(), &iv, &ciphertext)?
        .verify_truncated_left(&tag)
        .map_err(|_| EnvelopeError::DecryptionFailed)?;
    Aes256CbcDec::new_from_slices(enc_key, &iv)
        .map_err(|_| EnvelopeError::InvalidKey)?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| EnvelopeError::DecryptionFailed)
}

fn split_cbc_hs512_key(key: &[u8]) -> Result<(&[u8], &[u8]), EnvelopeError> {
    if key.len() != CBC_HS512_HALF_KEY_BYTES * 2 {
        return Err(EnvelopeError::InvalidKey);
    }
    Ok(key.split_at(CBC_HS512_HALF_KEY_BYTES))
}

// MAC input is AAD || IV || ciphertext || AL, with AL the AAD length in bits (u64 BE).
fn authentication_mac(
    mac_key: &[u8],
    aad: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<HmacSha512, EnvelopeError> {
    let mut mac = HmacSha512::new_from_slice(mac_key).map_err(|_| EnvelopeError::InvalidKey)?;
    mac.update(aad);
    mac.update(iv);
    mac.update(ciphertext);
    mac.update(&((aad.len() as u64) * 8).to_be_bytes());
    Ok(mac)
}

fn decode_segment(segment: &str, label: &str) -> Result<Vec<u8>, EnvelopeError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| EnvelopeError::Malformed(format!("JWE {label} is not base64url")))
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use serde_json::{json, Value};

    use super::{decrypt_compact, encrypt_compact, open, open_json, seal, seal_json, EnvelopeError};
    use crate::EnvelopeKeys;

    // RFC 7518 appendix B.3 (A256CBC-HS512) test vector.
    const RFC7518_KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f\
                                   202122232425262728292a2b2c2d2e2f303132333435363738393a3b3c3d3e3f";
    const RFC7518_IV_HEX: &str = "1af38c2dc2b96ffdd86694092341bc04";
    const RFC7518_AAD: &str = "The second principle of Auguste Kerckhoffs";
    const RFC7518_TAG_HEX: &str = "4dd3b4c088a7f45c216839645b2012bf2e6269a8c56a816dbc1b267761955bc5";

    #[test]
    fn unit_authentication_tag_matches_rfc7518_vector() {
        let key = hex::decode(RFC7518_KEY_HEX).expect("key");
        let iv = hex::decode(RFC7518_IV_HEX).expect("iv");
        let plaintext = b"A cipher system must not be required to be secret, and it must be able to fall into the hands of the enemy without inconvenience";
        let (mac_key, enc_key) = key.split_at(32);

        use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
        let ciphertext = super::Aes256CbcEnc::new_from_slices(enc_key, &iv)
            .expect("cipher")
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        use hmac::Mac;
        let tag = super::authentication_mac(mac_key, RFC7518_AAD.as_bytes(), &iv, &ciphertext)
            .expect("mac")
            .finalize()
            .into_bytes();
        assert_eq!(hex::encode(&tag[..32]), RFC7518_TAG_HEX);
    }

    #[test]
    fn functional_seal_then_open_returns_plaintext() {
        let keys = EnvelopeKeys::generate();
        for plaintext in [&b""[..], b"x", b"{\"idToken\":\"abc\",\"refreshToken\":\"xyz\"}"] {
            let blob = seal(plaintext, &keys).expect("seal");
            assert_eq!(open(&blob, &keys).expect("open"), plaintext);
        }
    }

    #[test]
    fn functional_json_helpers_stamp_claims_on_the_wire_only() {
        let keys = EnvelopeKeys::generate();
        let payload = json!({"idToken": "abc", "refreshToken": "xyz"});
        let blob = seal_json(&payload, &keys).expect("seal");

        let wire: Value = serde_json::from_slice(&open(&blob, &keys).expect("open")).expect("json");
        assert_eq!(wire["aud"], "fastchargeapi.com");
        assert_eq!(wire["iss"], "fastchargeapi.com");
        assert!(wire["iat"].is_u64());

        let opened: Value = open_json(&blob, &keys).expect("open json");
        assert_eq!(opened, payload);
    }

    #[test]
    fn regression_open_json_rejects_foreign_audience() {
        let keys = EnvelopeKeys::generate();
        let blob = seal(
            br#"{"idToken":"abc","refreshToken":"xyz","aud":"example.com"}"#,
            &keys,
        )
        .expect("seal");
        assert!(matches!(
            open_json::<Value>(&blob, &keys),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn functional_every_single_byte_flip_fails_signature_check() {
        let keys = EnvelopeKeys::generate();
        let blob = seal(br#"{"idToken":"abc","refreshToken":"xyz"}"#, &keys).expect("seal");
        let bytes = blob.as_bytes();
        for index in 0..bytes.len() {
            let mut tampered = bytes.to_vec();
            tampered[index] ^= 0x01;
            let tampered = String::from_utf8(tampered).expect("ascii stays utf-8");
            let result = open(&tampered, &keys);
            assert!(
                matches!(result, Err(EnvelopeError::SignatureInvalid)),
                "flip at {index} was not rejected as a signature failure"
            );
        }
    }

    #[test]
    fn functional_wrong_signing_secret_is_rejected() {
        let keys = EnvelopeKeys::generate();
        let other = EnvelopeKeys::generate();
        let blob = seal(b"payload", &keys).expect("seal");
        assert!(matches!(
            open(&blob, &other),
            Err(EnvelopeError::SignatureInvalid)
        ));
    }

    #[test]
    fn functional_wrong_encryption_secret_fails_decryption() {
        let keys = EnvelopeKeys::generate();
        let other = EnvelopeKeys::generate();
        let mixed = EnvelopeKeys::new(other.jwe_secret().to_vec(), keys.jwt_secret().to_vec())
            .expect("keys");
        let blob = seal(b"payload", &keys).expect("seal");
        assert!(matches!(
            open(&blob, &mixed),
            Err(EnvelopeError::DecryptionFailed)
        ));
    }

    #[test]
    fn regression_truncated_tag_is_not_accepted() {
        let keys = EnvelopeKeys::generate();
        let compact = encrypt_compact(b"payload", keys.jwe_secret()).expect("encrypt");
        let (prefix, tag) = compact.rsplit_once('.').expect("tag segment");
        let tag = URL_SAFE_NO_PAD.decode(tag).expect("tag");
        let shortened = format!("{prefix}.{}", URL_SAFE_NO_PAD.encode(&tag[..4]));
        assert!(matches!(
            decrypt_compact(&shortened, keys.jwe_secret()),
            Err(EnvelopeError::DecryptionFailed)
        ));
    }

    #[test]
    fn regression_jwe_with_unsupported_algorithm_is_malformed() {
        let keys = EnvelopeKeys::generate();
        let compact = encrypt_compact(b"payload", keys.jwe_secret()).expect("encrypt");
        let (_, rest) = compact.split_once('.').expect("header segment");
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"dir","enc":"A128GCM"}"#);
        assert!(matches!(
            decrypt_compact(&format!("{header}.{rest}"), keys.jwe_secret()),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn regression_empty_or_garbage_blob_is_rejected() {
        let keys = EnvelopeKeys::generate();
        for blob in ["", "abc", "a.b.c", "...."] {
            assert!(matches!(
                open(blob, &keys),
                Err(EnvelopeError::SignatureInvalid)
            ));
        }
    }
}
