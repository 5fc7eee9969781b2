#![no_main]

use std::sync::OnceLock;

use fastcharge_identity::{
    authorize_request,
    test_support::{primary_certificate_set, static_verifier},
    TokenVerifier, ANONYMOUS_PRINCIPAL_ID,
};
use libfuzzer_sys::fuzz_target;

fn verifier() -> &'static TokenVerifier {
    static VERIFIER: OnceLock<TokenVerifier> = OnceLock::new();
    VERIFIER.get_or_init(|| static_verifier(primary_certificate_set()).1)
}

fuzz_target!(|data: &[u8]| {
    let header = String::from_utf8_lossy(data);
    let decision = authorize_request(verifier(), Some(&header));
    assert!(!decision.is_allowed());
    assert_eq!(decision.principal_id(), ANONYMOUS_PRINCIPAL_ID);
});
