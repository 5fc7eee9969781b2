use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

use thiserror::Error;

pub const GOOGLE_SECURE_TOKEN_CERTIFICATE_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";
pub const DEFAULT_CERTIFICATE_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const CERTIFICATE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Key id → PEM-encoded X.509 certificate (or SPKI public key).
pub type IdentityCertificateSet = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum CertificateFetchError {
    #[error("certificate fetch failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("certificate endpoint returned status {status}")]
    HttpStatus { status: u16 },
    #[error("certificate set is malformed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Origin of the identity provider's current certificate set.
pub trait CertificateSource: Send + Sync {
    fn fetch(&self) -> Result<IdentityCertificateSet, CertificateFetchError>;
}

/// Fetches the certificate set from an HTTPS endpoint returning `{kid: pem}`.
#[derive(Debug, Clone)]
pub struct HttpCertificateSource {
    url: String,
    http: reqwest::blocking::Client,
}

impl HttpCertificateSource {
    pub fn new(url: impl Into<String>) -> Result<Self, CertificateFetchError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(CERTIFICATE_FETCH_TIMEOUT)
            .build()?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }

    pub fn google() -> Result<Self, CertificateFetchError> {
        Self::new(GOOGLE_SECURE_TOKEN_CERTIFICATE_URL)
    }
}

impl CertificateSource for HttpCertificateSource {
    fn fetch(&self) -> Result<IdentityCertificateSet, CertificateFetchError> {
        let response = self.http.get(&self.url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(CertificateFetchError::HttpStatus {
                status: status.as_u16(),
            });
        }
        let body = response.text()?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// In-process certificate source whose contents can be swapped to model rotation.
#[derive(Debug, Default)]
pub struct StaticCertificateSource {
    certificates: Mutex<IdentityCertificateSet>,
}

impl StaticCertificateSource {
    pub fn new(certificates: IdentityCertificateSet) -> Self {
        Self {
            certificates: Mutex::new(certificates),
        }
    }

    /// Replaces the published set; cached copies are unaffected until they expire.
    pub fn rotate(&self, certificates: IdentityCertificateSet) {
        *self
            .certificates
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = certificates;
    }
}

impl CertificateSource for StaticCertificateSource {
    fn fetch(&self) -> Result<IdentityCertificateSet, CertificateFetchError> {
        Ok(self
            .certificates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

struct CachedCertificates {
    certificates: Arc<IdentityCertificateSet>,
    fetched_at: Instant,
}

/// Time-bounded cache over a [`CertificateSource`].
///
/// Within one window the set is immutable and the source is hit at most once.
/// An unknown key id does not force a refetch; rotation becomes visible once
/// the window expires or [`CertificateCache::invalidate`] is called.
pub struct CertificateCache {
    source: Arc<dyn CertificateSource>,
    ttl: Duration,
    state: Mutex<Option<CachedCertificates>>,
    fetch_count: AtomicUsize,
}

impl std::fmt::Debug for CertificateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateCache")
            .field("ttl", &self.ttl)
            .field("fetch_count", &self.fetch_count())
            .finish_non_exhaustive()
    }
}

impl CertificateCache {
    pub fn new(source: Arc<dyn CertificateSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            state: Mutex::new(None),
            fetch_count: AtomicUsize::new(0),
        }
    }

    pub fn with_default_ttl(source: Arc<dyn CertificateSource>) -> Self {
        Self::new(source, DEFAULT_CERTIFICATE_CACHE_TTL)
    }

    /// Returns the current window's certificate set, fetching it if the window expired.
    pub fn certificates(&self) -> Result<Arc<IdentityCertificateSet>, CertificateFetchError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = state.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&cached.certificates));
            }
        }

        let certificates = Arc::new(self.source.fetch()?);
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            key_count = certificates.len(),
            ttl_secs = self.ttl.as_secs(),
            "identity certificates refreshed"
        );
        *state = Some(CachedCertificates {
            certificates: Arc::clone(&certificates),
            fetched_at: Instant::now(),
        });
        Ok(certificates)
    }

    pub fn certificate(&self, key_id: &str) -> Result<Option<String>, CertificateFetchError> {
        Ok(self.certificates()?.get(key_id).cloned())
    }

    /// Ends the current window; the next lookup refetches.
    pub fn invalidate(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Number of successful source fetches over the cache's lifetime.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::Relaxed)
    }
}
