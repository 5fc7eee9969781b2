use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

use crate::certificates::CertificateCache;

pub const DEFAULT_TOKEN_AUDIENCE: &str = "fastchargeapi";
pub const DEFAULT_TOKEN_LEEWAY_SECS: u64 = 60;

/// Identity extracted from a bearer token whose signature and claims checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub email: String,
    pub subject: Option<String>,
}

/// Uniform rejection. The specific cause is only emitted as a debug log.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("token is invalid")]
pub struct TokenInvalid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenVerifierConfig {
    pub audience: String,
    pub issuer: Option<String>,
    pub leeway_secs: u64,
}

impl Default for TokenVerifierConfig {
    fn default() -> Self {
        Self {
            audience: DEFAULT_TOKEN_AUDIENCE.to_string(),
            issuer: None,
            leeway_secs: DEFAULT_TOKEN_LEEWAY_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    sub: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RejectReason {
    MalformedHeader,
    UnsupportedAlgorithm,
    MissingKeyId,
    CertificatesUnavailable,
    UnknownKeyId,
    UnusableCertificate,
    SignatureOrClaims,
    MissingEmail,
}

impl RejectReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::MalformedHeader => "malformed_header",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::MissingKeyId => "missing_key_id",
            Self::CertificatesUnavailable => "certificates_unavailable",
            Self::UnknownKeyId => "unknown_key_id",
            Self::UnusableCertificate => "unusable_certificate",
            Self::SignatureOrClaims => "signature_or_claims",
            Self::MissingEmail => "missing_email",
        }
    }
}

/// RS256 id-token verifier backed by a shared [`CertificateCache`].
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    cache: Arc<CertificateCache>,
    config: TokenVerifierConfig,
}

impl TokenVerifier {
    pub fn new(cache: Arc<CertificateCache>, config: TokenVerifierConfig) -> Self {
        Self { cache, config }
    }

    pub fn cache(&self) -> &Arc<CertificateCache> {
        &self.cache
    }

    pub fn config(&self) -> &TokenVerifierConfig {
        &self.config
    }

    /// Verifies signature, audience, optional issuer, and expiry of `token`.
    pub fn verify(&self, token: &str) -> Result<VerifiedIdentity, TokenInvalid> {
        self.verify_inner(token).map_err(|reason| {
            tracing::debug!(reason_code = reason.as_str(), "id token rejected");
            TokenInvalid
        })
    }

    fn verify_inner(&self, token: &str) -> Result<VerifiedIdentity, RejectReason> {
        let header =
            jsonwebtoken::decode_header(token).map_err(|_| RejectReason::MalformedHeader)?;
        if header.alg != Algorithm::RS256 {
            return Err(RejectReason::UnsupportedAlgorithm);
        }
        let key_id = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(RejectReason::MissingKeyId)?;

        let certificate = self
            .cache
            .certificate(&key_id)
            .map_err(|error| {
                tracing::warn!(error = %error, "identity certificates unavailable");
                RejectReason::CertificatesUnavailable
            })?
            .ok_or(RejectReason::UnknownKeyId)?;
        // Accepts both X.509 certificates and bare SPKI public keys.
        let key = DecodingKey::from_rsa_pem(certificate.as_bytes())
            .map_err(|_| RejectReason::UnusableCertificate)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.config.audience.as_str()]);
        if let Some(issuer) = self.config.issuer.as_deref() {
            validation.set_issuer(&[issuer]);
        }
        validation.leeway = self.config.leeway_secs;

        let claims = jsonwebtoken::decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|_| RejectReason::SignatureOrClaims)?
            .claims;
        let email = claims
            .email
            .filter(|email| !email.trim().is_empty())
            .ok_or(RejectReason::MissingEmail)?;
        Ok(VerifiedIdentity {
            email,
            subject: claims.sub,
        })
    }
}
