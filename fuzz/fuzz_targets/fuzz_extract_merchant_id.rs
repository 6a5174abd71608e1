#![no_main]
use libfuzzer_sys::fuzz_target;
use merchant_advisor::sessions::{extract_merchant_id, normalize_merchant_id};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Some(id) = extract_merchant_id(text) {
            assert!(id.starts_with("mch_"));
            assert_eq!(normalize_merchant_id(&id).ok().as_deref(), Some(id.as_str()));
        }
    }
});
