//! RSA fixtures and token minting for tests in this and dependent crates.

use std::{sync::Arc, time::Duration};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use crate::{
    CertificateCache, IdentityCertificateSet, StaticCertificateSource, TokenVerifier,
    TokenVerifierConfig, DEFAULT_TOKEN_AUDIENCE,
};

pub const PRIMARY_KEY_ID: &str = "fixture-primary";
pub const ROTATED_KEY_ID: &str = "fixture-rotated";
pub const PRIMARY_PRIVATE_KEY_PEM: &str = include_str!("../testdata/primary.key.pem");
pub const PRIMARY_CERTIFICATE_PEM: &str = include_str!("../testdata/primary.cert.pem");
pub const PRIMARY_PUBLIC_KEY_PEM: &str = include_str!("../testdata/primary.pub.pem");
pub const ROTATED_PRIVATE_KEY_PEM: &str = include_str!("../testdata/rotated.key.pem");
pub const ROTATED_CERTIFICATE_PEM: &str = include_str!("../testdata/rotated.cert.pem");

/// Claims of a well-formed id token for `email`, expiring `expires_in_secs` from now.
pub fn id_token_claims(email: &str, expires_in_secs: i64) -> Value {
    let now = fastcharge_core::current_unix_timestamp() as i64;
    json!({
        "iss": "https://securetoken.google.com/fastchargeapi",
        "aud": DEFAULT_TOKEN_AUDIENCE,
        "sub": format!("uid-{email}"),
        "email": email,
        "iat": now - 10,
        "exp": now + expires_in_secs,
    })
}

/// Signs `claims` with RS256 under `private_key_pem`, stamping `key_id` in the header.
pub fn sign_test_token(key_id: &str, private_key_pem: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(key_id.to_string());
    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
        .expect("fixture private key must parse");
    jsonwebtoken::encode(&header, claims, &key).expect("fixture token must sign")
}

/// A currently valid id token for `email` signed by the primary fixture key.
pub fn valid_id_token(email: &str) -> String {
    sign_test_token(
        PRIMARY_KEY_ID,
        PRIMARY_PRIVATE_KEY_PEM,
        &id_token_claims(email, 3600),
    )
}

/// An id token for `email` whose expiry is well past the verifier leeway.
pub fn expired_id_token(email: &str) -> String {
    sign_test_token(
        PRIMARY_KEY_ID,
        PRIMARY_PRIVATE_KEY_PEM,
        &id_token_claims(email, -3600),
    )
}

pub fn primary_certificate_set() -> IdentityCertificateSet {
    IdentityCertificateSet::from([(
        PRIMARY_KEY_ID.to_string(),
        PRIMARY_CERTIFICATE_PEM.to_string(),
    )])
}

pub fn rotated_certificate_set() -> IdentityCertificateSet {
    IdentityCertificateSet::from([(
        ROTATED_KEY_ID.to_string(),
        ROTATED_CERTIFICATE_PEM.to_string(),
    )])
}

/// Verifier over a swappable in-memory certificate source with a one-hour window.
pub fn static_verifier(
    certificates: IdentityCertificateSet,
) -> (Arc<StaticCertificateSource>, TokenVerifier) {
    let source = Arc::new(StaticCertificateSource::new(certificates));
    let cache = Arc::new(CertificateCache::new(
        source.clone(),
        Duration::from_secs(3600),
    ));
    (
        source,
        TokenVerifier::new(cache, TokenVerifierConfig::default()),
    )
}
