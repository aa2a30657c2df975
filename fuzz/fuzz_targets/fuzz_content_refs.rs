#![no_main]
use libfuzzer_sys::fuzz_target;
use nostr_core::{parse_content, preview, Nip19Codec};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let parsed = parse_content(s, &Nip19Codec);
        assert!(!parsed.clean.contains("nostr:nevent"));
        let _ = preview(&parsed.clean, 16);
    }
});
