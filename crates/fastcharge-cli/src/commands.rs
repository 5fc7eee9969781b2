use anyhow::{bail, Result};
use fastcharge_auth::{LoginOutcome, Profile};
use serde_json::json;
use url::Url;

use crate::{
    bootstrap::{build_auth_session, build_credential_store, build_verifier},
    cli_args::{Cli, CliCommand},
};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let profile = Profile::parse(cli.profile.as_deref())?;
    match &cli.command {
        CliCommand::Login { no_browser } => run_login(&cli, &profile, *no_browser),
        CliCommand::Logout => run_logout(&cli, &profile),
        CliCommand::Status { json } => run_status(&cli, *json),
        CliCommand::Profiles => run_profiles(&cli),
        CliCommand::Verify { token } => run_verify(&cli, token),
    }
}

fn run_login(cli: &Cli, profile: &Profile, no_browser: bool) -> Result<()> {
    let session = build_auth_session(cli)?;
    let launch = |url: &Url| {
        println!("Please authenticate in the browser.");
        println!("If the browser does not open, please visit:");
        println!("{url}");
        if !no_browser {
            if let Err(error) = webbrowser::open(url.as_str()) {
                tracing::warn!(error = %error, "failed to open browser");
            }
        }
    };
    if let LoginOutcome::AlreadyLoggedIn(_) = session.login(profile, launch)? {
        tracing::debug!(profile = %profile, "stored credentials are still valid");
    }
    match profile {
        Profile::Default => println!("Login successful."),
        Profile::Named(name) => println!("Login successful for profile '{name}'."),
    }
    Ok(())
}

fn run_logout(cli: &Cli, profile: &Profile) -> Result<()> {
    let session = build_auth_session(cli)?;
    let selected = cli.profile.is_some().then_some(profile);
    let removed = session.logout(selected)?;
    tracing::debug!(removed = removed.len(), "credential files removed");
    println!("Logged out.");
    Ok(())
}

fn run_status(cli: &Cli, as_json: bool) -> Result<()> {
    let session = build_auth_session(cli)?;
    let statuses = session.status()?;
    if as_json {
        let rows: Vec<_> = statuses
            .iter()
            .map(|status| {
                json!({
                    "profile": status.profile.to_string(),
                    "email": status.email,
                    "issuer": status.issuer.as_str(),
                    "state": status.state.as_str(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if statuses.is_empty() {
        println!("Not logged in.");
        return Ok(());
    }
    for status in statuses {
        println!(
            "{}\t{}\t{}\t{}",
            status.profile,
            status.email.as_deref().unwrap_or("-"),
            status.issuer.as_str(),
            status.state.as_str()
        );
    }
    Ok(())
}

fn run_profiles(cli: &Cli) -> Result<()> {
    for profile in build_credential_store(cli)?.list_profiles()? {
        println!("{profile}");
    }
    Ok(())
}

fn run_verify(cli: &Cli, token: &str) -> Result<()> {
    let verifier = build_verifier(cli)?;
    let Ok(identity) = verifier.verify(token.trim()) else {
        bail!("token is invalid");
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "email": identity.email,
            "subject": identity.subject,
        }))?
    );
    Ok(())
}
