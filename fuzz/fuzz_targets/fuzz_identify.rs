#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use sift::{InputBuffer, Options, SignatureStore, Sniffer, format};

fn store() -> &'static SignatureStore {
    static STORE: OnceLock<SignatureStore> = OnceLock::new();
    STORE.get_or_init(|| SignatureStore::builtin().expect("builtin database loads"))
}

fuzz_target!(|data: &[u8]| {
    let store = store();
    let buffer = InputBuffer::prefix(data, store.prefix_len());
    let result = Sniffer::new(store).identify(&buffer);
    let _ = format(&result, &Options::default());
    let _ = result.mime_string();
});
