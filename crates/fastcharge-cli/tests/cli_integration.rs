use std::path::Path;

use assert_cmd::Command;
use fastcharge_identity::test_support::{expired_id_token, primary_certificate_set, valid_id_token};
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::tempdir;

fn binary_command(credential_dir: &Path) -> Command {
    let mut command = Command::new(assert_cmd::cargo::cargo_bin!("fastcharge"));
    command
        .env_clear()
        .env("FASTCHARGE_CREDENTIAL_DIR", credential_dir);
    command
}

fn certificate_server() -> MockServer {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/certs");
        then.status(200).json_body(json!(primary_certificate_set()));
    });
    server
}

fn seed_profile(dir: &Path, file_name: &str, body: Value) {
    std::fs::create_dir_all(dir).expect("credential dir");
    std::fs::write(dir.join(file_name), body.to_string()).expect("seed credential file");
}

#[test]
fn integration_profiles_lists_nothing_for_missing_directory() {
    let temp = tempdir().expect("tempdir");
    binary_command(&temp.path().join("absent"))
        .arg("profiles")
        .assert()
        .success()
        .stdout("");
}

#[test]
fn integration_verify_prints_identity_for_valid_token() {
    let temp = tempdir().expect("tempdir");
    let server = certificate_server();
    binary_command(temp.path())
        .args(["verify", &valid_id_token("a@x.com")])
        .args(["--certificate-url", &server.url("/certs")])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"email\": \"a@x.com\""));
}

#[test]
fn integration_verify_rejects_expired_token_with_short_error() {
    let temp = tempdir().expect("tempdir");
    let server = certificate_server();
    binary_command(temp.path())
        .args(["verify", &expired_id_token("a@x.com")])
        .args(["--certificate-url", &server.url("/certs")])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("error: token is invalid"));
}

#[test]
fn integration_status_json_reports_each_profile() {
    let temp = tempdir().expect("tempdir");
    let server = certificate_server();
    seed_profile(
        temp.path(),
        "auth.json",
        json!({
            "id_token": valid_id_token("a@x.com"),
            "refresh_token": "r1",
            "issuer": "firebase",
            "email": "a@x.com"
        }),
    );
    seed_profile(
        temp.path(),
        "auth.ci.json",
        json!({ "id_token": "opaque", "issuer": "fastchargeapi" }),
    );

    let output = binary_command(temp.path())
        .args(["status", "--json", "--certificate-url", &server.url("/certs")])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let rows: Value = serde_json::from_slice(&output).expect("status json");
    assert_eq!(
        rows,
        json!([
            { "profile": "default", "email": "a@x.com", "issuer": "firebase", "state": "valid" },
            { "profile": "ci", "email": null, "issuer": "fastchargeapi", "state": "unverified" }
        ])
    );
}

#[test]
fn integration_logout_removes_selected_profile_then_all() {
    let temp = tempdir().expect("tempdir");
    for file_name in ["auth.json", "auth.alice.json", "auth.bob.json"] {
        seed_profile(temp.path(), file_name, json!({ "id_token": "t" }));
    }

    binary_command(temp.path())
        .args(["logout", "--profile", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out."));
    assert!(!temp.path().join("auth.alice.json").exists());
    assert!(temp.path().join("auth.bob.json").exists());

    binary_command(temp.path()).arg("logout").assert().success();
    binary_command(temp.path())
        .arg("profiles")
        .assert()
        .success()
        .stdout("");
}

#[test]
fn regression_login_reports_certificate_outage_instead_of_crashing() {
    let temp = tempdir().expect("tempdir");
    let server = MockServer::start();
    let certs = server.mock(|when, then| {
        when.method(GET).path("/certs");
        then.status(503);
    });
    seed_profile(
        temp.path(),
        "auth.json",
        json!({
            "id_token": valid_id_token("a@x.com"),
            "refresh_token": "r1",
            "issuer": "firebase",
            "email": "a@x.com",
            "user_pk": "user-pk-1"
        }),
    );

    binary_command(temp.path())
        .args(["login", "--no-browser"])
        .args(["--certificate-url", &server.url("/certs")])
        .args(["--auth-service-url", &server.base_url()])
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with(
            "error: identity certificates are unavailable",
        ));
    certs.assert();
}

#[test]
fn regression_invalid_profile_name_is_rejected() {
    let temp = tempdir().expect("tempdir");
    binary_command(temp.path())
        .args(["profiles", "--profile", "../escape"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid profile name"));
}

#[test]
fn regression_poll_interval_below_minimum_is_rejected() {
    let temp = tempdir().expect("tempdir");
    binary_command(temp.path())
        .args(["login", "--poll-interval-secs", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 3"));
}
