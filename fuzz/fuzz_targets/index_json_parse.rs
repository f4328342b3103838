//! Fuzz target for tar index JSON parsing.
//!
//! This fuzzer feeds arbitrary byte sequences to the index deserializer,
//! checking for panics, crashes, or hangs.

#![no_main]

use hfstage::archive::TarIndex;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = serde_json::from_slice::<TarIndex>(data);
});
