#![no_main]

use libfuzzer_sys::fuzz_target;
use machine_protocol::utils::compression::{compress, decompress_exact, DEFAULT_LEVEL};

fuzz_target!(|data: &[u8]| {
    // Round trip must be lossless
    if let Ok(compressed) = compress(data, DEFAULT_LEVEL) {
        let out = decompress_exact(&compressed, data.len()).expect("own output inflates");
        assert_eq!(out, data);
    }

    // Raw input as a compressed body: must fail cleanly and respect the limit
    if let Some((&declared, rest)) = data.split_first() {
        let _ = decompress_exact(rest, usize::from(declared) * 64);
    }
});
