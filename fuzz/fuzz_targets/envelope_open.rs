#![no_main]

use std::sync::OnceLock;

use fastcharge_exchange::{open, EnvelopeError, EnvelopeKeys};
use libfuzzer_sys::fuzz_target;

fn fixed_keys() -> &'static EnvelopeKeys {
    static KEYS: OnceLock<EnvelopeKeys> = OnceLock::new();
    KEYS.get_or_init(|| {
        EnvelopeKeys::new(vec![0x11; 64], vec![0x22; 64]).expect("fixed envelope keys")
    })
}

fuzz_target!(|data: &[u8]| {
    let blob = String::from_utf8_lossy(data);
    match open(&blob, fixed_keys()) {
        Ok(plaintext) => assert!(plaintext.len() <= data.len()),
        Err(EnvelopeError::InvalidKey) => panic!("fixed keys must stay valid"),
        Err(_) => {}
    }
});
