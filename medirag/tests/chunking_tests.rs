//! Property tests for recursive chunking.

use medirag::chunking::{Chunker, RecursiveChunker};
use medirag::document::Document;
use proptest::prelude::*;

/// Text mixing words, separators and multi-byte characters.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            4 => "[a-z]{1,12}",
            2 => Just(" ".to_string()),
            1 => Just("\n".to_string()),
            1 => Just("\n\n".to_string()),
            1 => "[éü°ไทย]{1,4}",
        ],
        0..120,
    )
    .prop_map(|parts| parts.concat())
}

/// Chunk size and an overlap strictly smaller than it.
fn arb_params() -> impl Strategy<Value = (usize, usize)> {
    (1usize..80).prop_flat_map(|size| (Just(size), 0..size))
}

fn tail(text: &str, n: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count - n).collect()
}

fn head(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

/// **Property: chunk bound and exact overlap**
/// *For any* text and any `overlap < size`, every chunk is at most `size`
/// characters, consecutive chunks share exactly `overlap` characters, and the
/// text can be rebuilt from the chunks.
mod prop_chunk_bounds {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn chunks_respect_size_and_overlap(text in arb_text(), (size, overlap) in arb_params()) {
            let chunks = RecursiveChunker::new(size, overlap).split_text(&text);

            for chunk in &chunks {
                prop_assert!(chunk.chars().count() <= size);
                prop_assert!(!chunk.is_empty());
            }

            for pair in chunks.windows(2) {
                prop_assert!(pair[0].chars().count() > overlap);
                prop_assert_eq!(tail(&pair[0], overlap), head(&pair[1], overlap));
            }

            let mut rebuilt = chunks.first().cloned().unwrap_or_default();
            for chunk in chunks.iter().skip(1) {
                rebuilt.extend(chunk.chars().skip(overlap));
            }
            prop_assert_eq!(rebuilt, text);
        }

        #[test]
        fn chunking_is_deterministic(text in arb_text(), (size, overlap) in arb_params()) {
            let chunker = RecursiveChunker::new(size, overlap);
            let document = Document::new("doc", text);
            prop_assert_eq!(chunker.chunk(&document), chunker.chunk(&document));
        }

        #[test]
        fn whitespace_only_documents_have_no_chunks(
            text in "[ \n\t]{0,40}",
            (size, overlap) in arb_params(),
        ) {
            let chunks = RecursiveChunker::new(size, overlap).chunk(&Document::new("ws", text));
            prop_assert!(chunks.is_empty());
        }
    }
}

#[test]
fn default_parameters_split_long_medical_text() {
    let paragraph = "Fever is a temporary increase in body temperature, often due to an illness. \
                     Drink plenty of fluids and rest. See a doctor if the fever lasts more than three days.";
    let text = vec![paragraph; 20].join("\n\n");
    let chunks = RecursiveChunker::new(800, 120).split_text(&text);

    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.chars().count() <= 800));
    // every non-final chunk ends on a paragraph separator
    for chunk in &chunks[..chunks.len() - 1] {
        assert!(chunk.ends_with("\n\n"), "chunk ended mid-paragraph: {chunk:?}");
    }
}
