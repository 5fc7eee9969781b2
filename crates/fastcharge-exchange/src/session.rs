use std::{
    io::{BufRead, Write},
    sync::Arc,
    time::Duration,
};

use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::{
    envelope::{self, EnvelopeError},
    key_material::SecretExchangeKeyMaterial,
    remote_store::{RemoteSecretStore, RemoteStoreError},
};

pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_MAX_COUNT: u32 = 3;
/// Exclusive upper bound for [`SecretExchangeConfig::poll_max_count`].
pub const MAX_POLL_MAX_COUNT: u32 = 100;
pub const DEFAULT_TIMEOUT_PROMPT: &str = "Timed out. Press enter to retry.";
const LOGIN_PAGE_PATH: &str = "/auth/";
const DEFAULT_BEHAVIOR: &str = "putsecret";

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("invalid secret exchange configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid login page url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Store(#[from] RemoteStoreError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("secret exchange aborted")]
    Aborted,
    #[error("operator prompt failed: {0}")]
    Prompt(#[from] std::io::Error),
    #[error("secret was already delivered")]
    AlreadyDelivered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretExchangeConfig {
    /// Base URL of the web app hosting the login page.
    pub web_app_url: String,
    /// Value of the `behavior` query parameter telling the page what to do.
    pub behavior: String,
    pub poll_interval: Duration,
    pub poll_max_count: u32,
    pub timeout_prompt: String,
}

impl SecretExchangeConfig {
    pub fn new(web_app_url: impl Into<String>) -> Self {
        Self {
            web_app_url: web_app_url.into(),
            behavior: DEFAULT_BEHAVIOR.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_max_count: DEFAULT_POLL_MAX_COUNT,
            timeout_prompt: DEFAULT_TIMEOUT_PROMPT.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ExchangeError> {
        if self.poll_interval < MIN_POLL_INTERVAL {
            return Err(ExchangeError::InvalidConfig(format!(
                "poll interval must be at least {}s",
                MIN_POLL_INTERVAL.as_secs()
            )));
        }
        if self.poll_max_count == 0 || self.poll_max_count >= MAX_POLL_MAX_COUNT {
            return Err(ExchangeError::InvalidConfig(format!(
                "poll max count must be between 1 and {}",
                MAX_POLL_MAX_COUNT - 1
            )));
        }
        Ok(())
    }

    fn login_url(&self, material: &SecretExchangeKeyMaterial) -> Result<Url, ExchangeError> {
        let mut url = Url::parse(&self.web_app_url)?.join(LOGIN_PAGE_PATH)?;
        url.query_pairs_mut()
            .append_pair("relogin", "true")
            .append_pair("behavior", &self.behavior)
            .append_pair("key", material.exchange_key())
            .append_pair("jwe", &material.keys().jwe_hex())
            .append_pair("jwt", &material.keys().jwt_hex());
        Ok(url)
    }
}

pub trait PollSleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl PollSleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Asks the operator whether to keep waiting after a run of empty polls.
pub trait OperatorPrompt: Send + Sync {
    /// `Ok(true)` to resume polling, `Ok(false)` to abort.
    fn confirm_retry(&self, message: &str) -> std::io::Result<bool>;
}

/// Prints the prompt and waits for a line on stdin. End of input aborts.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompt;

impl OperatorPrompt for StdinPrompt {
    fn confirm_retry(&self, message: &str) -> std::io::Result<bool> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{message}")?;
        stdout.flush()?;
        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line)?;
        Ok(read > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Created,
    Polling,
    TimeoutPrompt,
    Delivered,
}

/// Entry point for one browser-mediated credential hand-off.
pub struct SecretExchangeSession;

impl SecretExchangeSession {
    /// Generates fresh key material, builds the login URL, and hands it to `launch`.
    ///
    /// `launch` typically opens a browser and prints the URL. It has no way to
    /// fail the exchange.
    pub fn begin(
        config: SecretExchangeConfig,
        store: Arc<dyn RemoteSecretStore>,
        launch: impl FnOnce(&Url),
    ) -> Result<PollHandle, ExchangeError> {
        config.validate()?;
        let material = SecretExchangeKeyMaterial::generate();
        let url = config.login_url(&material)?;
        tracing::debug!(
            backend = %store.backend(),
            poll_interval_secs = config.poll_interval.as_secs(),
            poll_max_count = config.poll_max_count,
            "secret exchange started"
        );
        launch(&url);
        Ok(PollHandle {
            config,
            store,
            material,
            url,
            state: ExchangeState::Created,
            sleeper: Arc::new(ThreadSleeper),
            prompt: Arc::new(StdinPrompt),
        })
    }
}

/// Blocking reader for the value the browser deposits.
pub struct PollHandle {
    config: SecretExchangeConfig,
    store: Arc<dyn RemoteSecretStore>,
    material: SecretExchangeKeyMaterial,
    url: Url,
    state: ExchangeState,
    sleeper: Arc<dyn PollSleeper>,
    prompt: Arc<dyn OperatorPrompt>,
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("state", &self.state)
            .field("exchange_key", &self.material.exchange_key())
            .finish_non_exhaustive()
    }
}

impl PollHandle {
    pub fn with_sleeper(mut self, sleeper: Arc<dyn PollSleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn OperatorPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Login URL carrying the one-time secrets. Treat it as sensitive.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn material(&self) -> &SecretExchangeKeyMaterial {
        &self.material
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Polls until the sealed value arrives, then opens it.
    ///
    /// Sleeps before each regular poll. After `poll_max_count` consecutive
    /// empty polls the operator is prompted. A confirmed retry polls
    /// immediately and starts a new run.
    pub fn read(&mut self) -> Result<Vec<u8>, ExchangeError> {
        if self.state == ExchangeState::Delivered {
            return Err(ExchangeError::AlreadyDelivered);
        }
        let key = self.material.exchange_key().to_string();
        let mut empty_polls = 0u32;
        let mut sleep_before_poll = true;
        loop {
            self.state = ExchangeState::Polling;
            if sleep_before_poll {
                self.sleeper.sleep(self.config.poll_interval);
            }
            sleep_before_poll = true;

            match self.store.get(&key) {
                Ok(Some(sealed)) => {
                    let plaintext = envelope::open(&sealed, self.material.keys())?;
                    self.state = ExchangeState::Delivered;
                    tracing::debug!(empty_polls, "secret exchange delivered");
                    return Ok(plaintext);
                }
                Ok(None) => {}
                Err(error) if error.is_transient() => {
                    tracing::warn!(error = %error, "secret store poll failed; will retry");
                }
                Err(error) => return Err(error.into()),
            }

            empty_polls += 1;
            if empty_polls >= self.config.poll_max_count {
                self.state = ExchangeState::TimeoutPrompt;
                if !self.prompt.confirm_retry(&self.config.timeout_prompt)? {
                    return Err(ExchangeError::Aborted);
                }
                empty_polls = 0;
                sleep_before_poll = false;
            }
        }
    }

    pub fn read_json<T: DeserializeOwned>(&mut self) -> Result<T, ExchangeError> {
        let plaintext = self.read()?;
        Ok(envelope::decode_json_payload(&plaintext)?)
    }
}
