#![no_main]
use libfuzzer_sys::fuzz_target;
use merchant_advisor::sessions::SessionState;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Parsing must never panic; accepted states must re-validate.
        if let Ok(state) = SessionState::from_json(text) {
            assert!(state.validate().is_ok());
        }
    }
});
