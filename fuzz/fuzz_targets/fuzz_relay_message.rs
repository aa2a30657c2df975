#![no_main]
use libfuzzer_sys::fuzz_target;
use nostr_core::RelayMessage;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Parsing arbitrary relay frames must never panic.
        let _ = RelayMessage::from_json(s);
    }
});
