//! Fuzz target for model reference resolution.
//!
//! Feeds arbitrary UTF-8 strings to the resolver and checks that every
//! accepted reference resolves to itself through its canonical form.

#![no_main]

use hfstage::hf::resolve::resolve_reference;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(resolved) = resolve_reference(input) {
        assert!(!resolved.repository.is_empty());
        if let Some(file) = resolved.file_in_repo() {
            assert!(!file.split('/').any(|segment| segment == ".." || segment == "."));
        }
        assert_eq!(resolve_reference(&resolved.canonical()).ok(), Some(resolved));
    }
});
