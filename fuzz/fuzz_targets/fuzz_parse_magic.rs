#![no_main]

use libfuzzer_sys::fuzz_target;
use sift::SignatureStore;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    // Malformed databases must fail with an error, never a panic
    if let Ok(store) = SignatureStore::parse("fuzz", &text) {
        let _ = store.prefix_len();
        let _ = sift::identify(&store, data);
    }
});
