//! Bearer token verification against the identity provider's rotating
//! certificate set.
//!
//! [`CertificateCache`] fetches the key-id → PEM map at most once per cache
//! window. [`TokenVerifier`] checks RS256 signatures and the audience, issuer,
//! and expiry claims, and yields a [`VerifiedIdentity`]. [`authorize_request`]
//! is the request-authorizer entry point built on the same verifier.

mod authorizer;
mod certificates;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
mod verifier;

pub use authorizer::{authorize_request, AuthorizerDecision, ANONYMOUS_PRINCIPAL_ID};
pub use certificates::{
    CertificateCache, CertificateFetchError, CertificateSource, HttpCertificateSource,
    IdentityCertificateSet, StaticCertificateSource, DEFAULT_CERTIFICATE_CACHE_TTL,
    GOOGLE_SECURE_TOKEN_CERTIFICATE_URL,
};
pub use verifier::{
    TokenInvalid, TokenVerifier, TokenVerifierConfig, VerifiedIdentity, DEFAULT_TOKEN_AUDIENCE,
    DEFAULT_TOKEN_LEEWAY_SECS,
};
