use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fastcharge_exchange::{
    DEFAULT_POLL_INTERVAL, DEFAULT_POLL_MAX_COUNT, DEFAULT_SECRET_BUCKET_URL, MAX_POLL_MAX_COUNT,
    MIN_POLL_INTERVAL,
};
use fastcharge_identity::{
    DEFAULT_TOKEN_AUDIENCE, DEFAULT_TOKEN_LEEWAY_SECS, GOOGLE_SECURE_TOKEN_CERTIFICATE_URL,
};

use crate::cli_types::CliSecretTransport;

fn parse_poll_interval_secs(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed < MIN_POLL_INTERVAL.as_secs() {
        return Err(format!(
            "value must be at least {}",
            MIN_POLL_INTERVAL.as_secs()
        ));
    }
    Ok(parsed)
}

fn parse_poll_max_count(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if !(1..MAX_POLL_MAX_COUNT).contains(&parsed) {
        return Err(format!(
            "value must be in range 1..={}",
            MAX_POLL_MAX_COUNT - 1
        ));
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "fastcharge",
    about = "Log in to FastchargeAPI and manage stored credentials",
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "FASTCHARGE_PROFILE",
        help = "Credential profile to use. Defaults to the unnamed profile."
    )]
    pub profile: Option<String>,

    #[arg(
        long = "credential-dir",
        global = true,
        env = "FASTCHARGE_CREDENTIAL_DIR",
        help = "Directory holding credential files. Defaults to ~/.fastcharge."
    )]
    pub credential_dir: Option<PathBuf>,

    #[arg(
        long = "credential-store-key",
        global = true,
        env = "FASTCHARGE_CREDENTIAL_STORE_KEY",
        hide_env_values = true,
        help = "Passphrase used to encrypt stored tokens at rest"
    )]
    pub credential_store_key: Option<String>,

    #[arg(
        long = "dev-domain",
        global = true,
        env = "FASTCHARGE_DEV_DOMAIN",
        help = "Target the development deployment instead of production"
    )]
    pub dev_domain: bool,

    #[arg(long = "graphql-url", global = true, env = "FASTCHARGE_GRAPHQL_URL")]
    pub graphql_url: Option<String>,

    #[arg(
        long = "auth-service-url",
        global = true,
        env = "FASTCHARGE_AUTH_SERVICE_URL"
    )]
    pub auth_service_url: Option<String>,

    #[arg(long = "web-app-url", global = true, env = "FASTCHARGE_WEB_APP_URL")]
    pub web_app_url: Option<String>,

    #[arg(
        long = "backend-refresh-url",
        global = true,
        env = "FASTCHARGE_BACKEND_REFRESH_URL",
        help = "Refresh endpoint for backend-issued tokens. Forced refresh of such tokens fails without it."
    )]
    pub backend_refresh_url: Option<String>,

    #[arg(
        long = "certificate-url",
        global = true,
        env = "FASTCHARGE_CERTIFICATE_URL",
        default_value = GOOGLE_SECURE_TOKEN_CERTIFICATE_URL
    )]
    pub certificate_url: String,

    #[arg(
        long = "secret-bucket-url",
        global = true,
        env = "FASTCHARGE_SECRET_BUCKET_URL",
        default_value = DEFAULT_SECRET_BUCKET_URL
    )]
    pub secret_bucket_url: String,

    #[arg(
        long = "secret-transport",
        global = true,
        env = "FASTCHARGE_SECRET_TRANSPORT",
        value_enum,
        default_value_t = CliSecretTransport::DataApi
    )]
    pub secret_transport: CliSecretTransport,

    #[arg(
        long = "token-audience",
        global = true,
        env = "FASTCHARGE_TOKEN_AUDIENCE",
        default_value = DEFAULT_TOKEN_AUDIENCE
    )]
    pub token_audience: String,

    #[arg(long = "token-issuer", global = true, env = "FASTCHARGE_TOKEN_ISSUER")]
    pub token_issuer: Option<String>,

    #[arg(
        long = "token-leeway-secs",
        global = true,
        env = "FASTCHARGE_TOKEN_LEEWAY_SECS",
        default_value_t = DEFAULT_TOKEN_LEEWAY_SECS
    )]
    pub token_leeway_secs: u64,

    #[arg(
        long = "poll-interval-secs",
        global = true,
        env = "FASTCHARGE_POLL_INTERVAL_SECS",
        default_value_t = DEFAULT_POLL_INTERVAL.as_secs(),
        value_parser = parse_poll_interval_secs
    )]
    pub poll_interval_secs: u64,

    #[arg(
        long = "poll-max-count",
        global = true,
        env = "FASTCHARGE_POLL_MAX_COUNT",
        default_value_t = DEFAULT_POLL_MAX_COUNT,
        value_parser = parse_poll_max_count
    )]
    pub poll_max_count: u32,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Log in through the browser and store the credentials.
    Login {
        #[arg(long = "no-browser", help = "Print the login URL without opening a browser")]
        no_browser: bool,
    },
    /// Remove stored credentials for --profile, or for every profile.
    Logout,
    /// Show stored profiles and whether their tokens are still valid.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// List stored profile names.
    Profiles,
    /// Verify an id token and print the identity it carries.
    Verify { token: String },
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{parse_poll_interval_secs, parse_poll_max_count, Cli, CliCommand};
    use crate::cli_types::CliSecretTransport;

    #[test]
    fn unit_poll_value_parsers_enforce_bounds() {
        assert!(parse_poll_interval_secs("2").is_err());
        assert_eq!(parse_poll_interval_secs("3"), Ok(3));
        assert!(parse_poll_max_count("0").is_err());
        assert!(parse_poll_max_count("100").is_err());
        assert_eq!(parse_poll_max_count("99"), Ok(99));
    }

    #[test]
    fn functional_global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "fastcharge",
            "status",
            "--json",
            "--profile",
            "alice",
            "--secret-transport",
            "object-storage",
        ])
        .expect("parse");
        assert_eq!(cli.profile.as_deref(), Some("alice"));
        assert_eq!(cli.secret_transport, CliSecretTransport::ObjectStorage);
        assert!(matches!(cli.command, CliCommand::Status { json: true }));
        assert_eq!(cli.poll_interval_secs, 5);
        assert_eq!(cli.poll_max_count, 3);
    }
}
