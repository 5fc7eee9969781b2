use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use fastcharge_auth::{
    AuthSession, AuthSessionDeps, CredentialStore, DataApiUserDirectory, HttpTokenRefresher,
    TokenRefresher,
};
use fastcharge_dataapi::DataApiClient;
use fastcharge_exchange::{open_remote_store, SecretExchangeConfig};
use fastcharge_identity::{
    CertificateCache, HttpCertificateSource, TokenVerifier, TokenVerifierConfig,
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli_args::Cli;

const PRODUCTION_DOMAIN: &str = "fastchargeapi.com";
const DEV_DOMAIN: &str = "devfastchargeapi.com";

pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Service URLs after applying explicit overrides to the domain defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoints {
    pub graphql_url: String,
    pub auth_service_url: String,
    pub web_app_url: String,
}

impl Endpoints {
    pub(crate) fn resolve(cli: &Cli) -> Self {
        let domain = if cli.dev_domain {
            DEV_DOMAIN
        } else {
            PRODUCTION_DOMAIN
        };
        Self {
            graphql_url: cli
                .graphql_url
                .clone()
                .unwrap_or_else(|| format!("https://api.graphql.{domain}")),
            auth_service_url: cli
                .auth_service_url
                .clone()
                .unwrap_or_else(|| format!("https://api.v2.auth.{domain}")),
            web_app_url: cli
                .web_app_url
                .clone()
                .unwrap_or_else(|| format!("https://{domain}")),
        }
    }
}

pub(crate) fn build_credential_store(cli: &Cli) -> Result<CredentialStore> {
    let root: PathBuf = match &cli.credential_dir {
        Some(dir) => dir.clone(),
        None => CredentialStore::default_root()?,
    };
    Ok(CredentialStore::new(root).with_store_key(cli.credential_store_key.clone()))
}

pub(crate) fn build_verifier(cli: &Cli) -> Result<TokenVerifier> {
    let source = HttpCertificateSource::new(cli.certificate_url.clone())
        .context("failed to build certificate client")?;
    let cache = CertificateCache::with_default_ttl(Arc::new(source));
    Ok(TokenVerifier::new(
        Arc::new(cache),
        TokenVerifierConfig {
            audience: cli.token_audience.clone(),
            issuer: cli.token_issuer.clone(),
            leeway_secs: cli.token_leeway_secs,
        },
    ))
}

pub(crate) fn build_auth_session(cli: &Cli) -> Result<AuthSession> {
    let endpoints = Endpoints::resolve(cli);
    tracing::debug!(
        graphql_url = %endpoints.graphql_url,
        auth_service_url = %endpoints.auth_service_url,
        web_app_url = %endpoints.web_app_url,
        "resolved service endpoints"
    );

    let data_api = DataApiClient::new(endpoints.graphql_url.clone())
        .context("failed to build data api client")?;
    let identity_provider = HttpTokenRefresher::identity_provider(&endpoints.auth_service_url)
        .context("failed to build refresh client")?;
    let backend = match cli.backend_refresh_url.as_deref() {
        Some(url) => Some(Arc::new(
            HttpTokenRefresher::new(url).context("failed to build backend refresh client")?,
        ) as Arc<dyn TokenRefresher>),
        None => None,
    };
    let secret_store = open_remote_store(
        cli.secret_transport.into(),
        &data_api,
        &cli.secret_bucket_url,
    )
    .context("failed to open secret store")?;

    let mut exchange = SecretExchangeConfig::new(endpoints.web_app_url);
    exchange.poll_interval = Duration::from_secs(cli.poll_interval_secs);
    exchange.poll_max_count = cli.poll_max_count;
    exchange.validate()?;

    Ok(AuthSession::new(AuthSessionDeps {
        store: build_credential_store(cli)?,
        verifier: Arc::new(build_verifier(cli)?),
        identity_provider: Arc::new(identity_provider),
        backend,
        users: Arc::new(DataApiUserDirectory::new(data_api)),
        secret_store,
        exchange,
    }))
}
