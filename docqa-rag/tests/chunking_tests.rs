//! Property tests for paragraph chunking.

use docqa_rag::{Chunker, ParagraphChunker};
use proptest::prelude::*;

/// Text built from words, single newlines, blank lines, and stray whitespace.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            "[a-zA-Z0-9.,]{1,8}",
            Just(" ".to_string()),
            Just("\n".to_string()),
            Just("\n\n".to_string()),
            Just("\r\n\r\n".to_string()),
            Just("\t".to_string()),
        ],
        0..40,
    )
    .prop_map(|parts| parts.concat())
}

fn non_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// No chunk is blank or carries surrounding whitespace.
    #[test]
    fn chunks_are_trimmed_and_non_blank(text in arb_text()) {
        for chunk in ParagraphChunker.chunk(&text) {
            prop_assert!(!chunk.trim().is_empty());
            prop_assert_eq!(chunk.trim(), chunk.as_str());
        }
    }

    /// Concatenating the chunks keeps every non-blank character in order.
    #[test]
    fn content_order_is_preserved(text in arb_text()) {
        let joined: String = ParagraphChunker.chunk(&text).concat();
        prop_assert_eq!(non_whitespace(&joined), non_whitespace(&text));
    }

    /// Text without a blank line is a single chunk (or none when blank).
    #[test]
    fn text_without_blank_line_is_one_chunk(text in "[a-z ]{0,20}(\n[a-z ]{1,20}){0,3}") {
        let chunks = ParagraphChunker.chunk(&text);
        if text.trim().is_empty() {
            prop_assert!(chunks.is_empty());
        } else {
            prop_assert_eq!(chunks, vec![text.trim().to_string()]);
        }
    }
}

#[test]
fn reference_examples() {
    assert_eq!(ParagraphChunker.chunk("a\n\nb"), vec!["a", "b"]);
    assert!(ParagraphChunker.chunk("").is_empty());
    assert_eq!(ParagraphChunker.chunk("only one para"), vec!["only one para"]);
}
