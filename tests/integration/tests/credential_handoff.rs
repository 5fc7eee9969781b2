use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use fastcharge_auth::{
    AuthSession, AuthSessionDeps, CredentialPatch, CredentialState, CredentialStore,
    DataApiUserDirectory, HttpTokenRefresher, LoginOutcome, Profile,
};
use fastcharge_dataapi::DataApiClient;
use fastcharge_exchange::{
    seal_json, DataApiSecretStore, EnvelopeKeys, MemorySecretStore, ObjectStorageSecretStore,
    PollSleeper, RemoteSecretStore, SecretExchangeConfig, SecretExchangeSession,
};
use fastcharge_identity::{
    authorize_request,
    test_support::{
        expired_id_token, id_token_claims, primary_certificate_set, sign_test_token,
        static_verifier, valid_id_token, ROTATED_CERTIFICATE_PEM, ROTATED_KEY_ID,
        ROTATED_PRIVATE_KEY_PEM,
    },
    CertificateCache, HttpCertificateSource, TokenVerifier, TokenVerifierConfig,
};
use httpmock::prelude::*;
use serde_json::{json, Value};
use tempfile::tempdir;
use url::Url;

#[derive(Default)]
struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl PollSleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().expect("sleeps").push(duration);
    }
}

fn query_param(url: &Url, name: &str) -> String {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .expect("query parameter")
}

/// Seals `payload` the way the browser login page does, using the URL's secrets.
fn browser_seal(url: &Url, payload: &Value) -> (String, String) {
    let keys = EnvelopeKeys::from_hex(&query_param(url, "jwe"), &query_param(url, "jwt"))
        .expect("keys from url");
    let sealed = seal_json(payload, &keys).expect("seal");
    (query_param(url, "key"), sealed)
}

#[test]
fn integration_sealed_tokens_are_delivered_exactly_once() {
    let store = Arc::new(MemorySecretStore::default());
    let sleeper = Arc::new(RecordingSleeper::default());
    let payload = json!({ "idToken": "abc", "refreshToken": "xyz" });

    let mut handle = SecretExchangeSession::begin(
        SecretExchangeConfig::new("https://fastchargeapi.com"),
        store.clone(),
        |url| {
            let (key, sealed) = browser_seal(url, &payload);
            store.put(&key, &sealed).expect("browser put");
        },
    )
    .expect("begin")
    .with_sleeper(sleeper.clone());

    let delivered: Value = handle.read_json().expect("read");
    assert_eq!(delivered, payload);
    assert_eq!(
        store.get(handle.material().exchange_key()).expect("second get"),
        None
    );
    assert_eq!(sleeper.sleeps.lock().expect("sleeps").len(), 1);
}

#[test]
fn integration_data_api_transport_reads_sealed_secret_by_exchange_key() {
    let server = MockServer::start();
    let store = Arc::new(DataApiSecretStore::new(
        DataApiClient::new(server.url("/graphql")).expect("client"),
    ));
    let payload = json!({ "idToken": "abc", "refreshToken": "xyz" });

    let mut handle = SecretExchangeSession::begin(
        SecretExchangeConfig::new("https://fastchargeapi.com"),
        store,
        |url| {
            let (key, sealed) = browser_seal(url, &payload);
            server.mock(|when, then| {
                when.method(POST)
                    .path("/graphql")
                    .header("authorization", "anonymous")
                    .body_includes(format!("\"key\":\"{key}\""));
                then.status(200).json_body(json!({
                    "data": { "getSecret": { "value": sealed, "deleteSecret": { "key": key } } }
                }));
            });
        },
    )
    .expect("begin")
    .with_sleeper(Arc::new(RecordingSleeper::default()));

    let delivered: Value = handle.read_json().expect("read");
    assert_eq!(delivered, payload);
}

#[test]
fn integration_rotated_key_is_accepted_after_certificate_refetch() {
    let server = MockServer::start();
    let mut first = server.mock(|when, then| {
        when.method(GET).path("/certs");
        then.status(200).json_body(json!(primary_certificate_set()));
    });
    let source = HttpCertificateSource::new(server.url("/certs")).expect("source");
    let cache = Arc::new(CertificateCache::new(
        Arc::new(source),
        Duration::from_secs(3600),
    ));
    let verifier = TokenVerifier::new(cache.clone(), TokenVerifierConfig::default());

    let token = sign_test_token(
        ROTATED_KEY_ID,
        ROTATED_PRIVATE_KEY_PEM,
        &id_token_claims("a@x.com", 3600),
    );
    assert!(verifier.verify(&token).is_err());
    let header = format!("Bearer {token}");
    assert!(!authorize_request(&verifier, Some(&header)).is_allowed());

    first.delete();
    let mut rotated = primary_certificate_set();
    rotated.insert(ROTATED_KEY_ID.to_string(), ROTATED_CERTIFICATE_PEM.to_string());
    server.mock(|when, then| {
        when.method(GET).path("/certs");
        then.status(200).json_body(json!(rotated));
    });
    cache.invalidate();

    let identity = verifier.verify(&token).expect("verifies after rotation");
    assert_eq!(identity.email, "a@x.com");
    assert!(authorize_request(&verifier, Some(&header)).is_allowed());
    assert_eq!(cache.fetch_count(), 2);
}

#[test]
fn integration_expired_profile_is_refreshed_through_auth_service() {
    let temp = tempdir().expect("tempdir");
    let server = MockServer::start();
    let fresh = valid_id_token("a@x.com");
    let refresh = server.mock(|when, then| {
        when.method(POST)
            .path("/refresh-idtoken")
            .json_body(json!({ "refreshToken": "r1" }));
        then.status(200)
            .json_body(json!({ "idToken": fresh, "refreshToken": "r2" }));
    });
    let lookup = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .header("x-user-email", "a@x.com")
            .body_includes("GetUserPKByEmail");
        then.status(200)
            .json_body(json!({ "data": { "getUserByEmail": { "pk": "user-pk-1" } } }));
    });

    let store = CredentialStore::new(temp.path());
    let alice = Profile::Named("alice".to_string());
    let expired = expired_id_token("a@x.com");
    store
        .write(
            &alice,
            CredentialPatch {
                id_token: Some(expired.clone()),
                refresh_token: Some("r1".to_string()),
                ..CredentialPatch::default()
            },
        )
        .expect("seed");

    let session = auth_session(
        store,
        &server,
        Arc::new(MemorySecretStore::default()),
        "https://fastchargeapi.com",
    );
    let record = session
        .current(&alice, false)
        .expect("current")
        .expect("record");
    assert_eq!(record.id_token.as_deref(), Some(fresh.as_str()));
    assert_eq!(record.user_pk.as_deref(), Some("user-pk-1"));
    refresh.assert();
    lookup.assert();

    let on_disk: Value = serde_json::from_str(
        &std::fs::read_to_string(temp.path().join("auth.alice.json")).expect("file"),
    )
    .expect("json");
    assert_eq!(on_disk["id_token"], json!(fresh));
    assert_eq!(on_disk["refresh_token"], json!("r2"));
    assert_ne!(on_disk["id_token"], json!(expired));
}

#[test]
fn integration_login_over_object_storage_then_status_and_logout() {
    let temp = tempdir().expect("tempdir");
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql").body_includes("GetUserPKByEmail");
        then.status(200)
            .json_body(json!({ "data": { "getUserByEmail": { "pk": "user-pk-1" } } }));
    });
    let secrets = Arc::new(
        ObjectStorageSecretStore::new(&server.url("/bucket")).expect("object storage"),
    );
    let session = auth_session(
        CredentialStore::new(temp.path()),
        &server,
        secrets,
        "https://fastchargeapi.com",
    );
    let token = valid_id_token("a@x.com");

    let outcome = session
        .login(&Profile::Default, |url| {
            let (key, sealed) = browser_seal(
                url,
                &json!({ "idToken": token, "refreshToken": "r1" }),
            );
            server.mock(|when, then| {
                when.method(GET).path(format!("/bucket/{key}"));
                then.status(200).body(sealed);
            });
            server.mock(|when, then| {
                when.method(DELETE).path(format!("/bucket/{key}"));
                then.status(204);
            });
        })
        .expect("login");
    assert!(matches!(outcome, LoginOutcome::LoggedIn(_)));
    assert_eq!(outcome.record().user_pk.as_deref(), Some("user-pk-1"));

    let statuses = session.status().expect("status");
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].state, CredentialState::Valid);
    assert_eq!(statuses[0].email.as_deref(), Some("a@x.com"));

    assert_eq!(
        session.logout(None).expect("logout"),
        vec![Profile::Default]
    );
    assert!(session.status().expect("status").is_empty());
}

fn auth_session(
    store: CredentialStore,
    server: &MockServer,
    secret_store: Arc<dyn RemoteSecretStore>,
    web_app_url: &str,
) -> AuthSession {
    let (_, verifier) = static_verifier(primary_certificate_set());
    let data_api = DataApiClient::new(server.url("/graphql")).expect("client");
    AuthSession::new(AuthSessionDeps {
        store,
        verifier: Arc::new(verifier),
        identity_provider: Arc::new(
            HttpTokenRefresher::identity_provider(&server.base_url()).expect("refresher"),
        ),
        backend: None,
        users: Arc::new(DataApiUserDirectory::new(data_api)),
        secret_store,
        exchange: SecretExchangeConfig::new(web_app_url),
    })
    .with_poll_sleeper(Arc::new(RecordingSleeper::default()))
}
