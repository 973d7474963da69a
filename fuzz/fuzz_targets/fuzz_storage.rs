#![no_main]

use levin_p2p::core::storage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must fail cleanly, never panic or over-allocate
    if let Ok((section, _)) = storage::decode(data, true) {
        // Anything that decodes re-encodes to an equivalent section
        if let Ok(bytes) = storage::encode(&section, true) {
            let (again, rest) = storage::decode(&bytes, true).expect("re-decode");
            assert!(rest.is_empty());
            assert_eq!(format!("{again:?}"), format!("{section:?}"));
        }
    }
    let _ = storage::decode(data, false);
});
