#![allow(dead_code)]

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// A Hub owner or repo name segment.
pub fn arb_segment() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9_-]{0,15}"
}

/// A relative file path inside a repo, one to three segments deep.
pub fn arb_file_path() -> impl Strategy<Value = String> {
    prop::collection::vec("[A-Za-z0-9_-]{1,10}(\\.[a-z]{1,4})?", 1..=3)
        .prop_map(|segments| segments.join("/"))
}

/// Reference strings in every accepted shape.
pub fn arb_reference() -> impl Strategy<Value = String> {
    (
        arb_segment(),
        arb_segment(),
        prop::option::of(arb_file_path()),
        0..4usize,
    )
        .prop_map(|(owner, name, file, shape)| match (file, shape) {
            (None, 0 | 1) => format!("{owner}/{name}"),
            (None, _) => format!("https://huggingface.co/{owner}/{name}"),
            (Some(file), 0) => {
                format!("https://huggingface.co/{owner}/{name}/resolve/main/{file}")
            }
            (Some(file), 1) => format!("https://hf-mirror.com/{owner}/{name}/blob/main/{file}"),
            (Some(file), 2) => format!(
                "https://huggingface.co/{owner}/{name}/resolve/main/{file}?download=true"
            ),
            (Some(file), _) => format!("https://huggingface.co/{owner}/{name}/blob/main/{file}"),
        })
}

/// Hub-shaped strings built from loose segments: blanks, dots, empty
/// pieces and stray markers. Many are rejected; those accepted must still
/// round-trip.
pub fn arb_loose_reference() -> impl Strategy<Value = String> {
    (
        prop::collection::vec("[ A-Za-z0-9._-]{0,4}", 1..=4),
        prop::option::of(prop::collection::vec("[ A-Za-z0-9._-]{0,4}", 0..=3)),
        prop::sample::select(vec![
            "https://huggingface.co/",
            "https://hf-mirror.com/",
            "",
            " ",
        ]),
        prop::sample::select(vec!["/resolve/main", "/blob/main"]),
        any::<bool>(),
    )
        .prop_map(|(repo, file, host, marker, query)| {
            let mut out = format!("{host}{}", repo.join("/"));
            if let Some(file) = file {
                out.push_str(marker);
                for segment in file {
                    out.push('/');
                    out.push_str(&segment);
                }
            }
            if query {
                out.push_str("?download=true");
            }
            out
        })
}
