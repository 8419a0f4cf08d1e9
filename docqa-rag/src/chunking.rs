//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`ParagraphChunker`], which
//! splits text on blank lines. No sentence or paragraph awareness is applied
//! beyond that.

/// A strategy for splitting extracted document text into passage texts.
///
/// Implementations must be pure: the same input always yields the same
/// output, and no returned element is empty or whitespace-only.
pub trait Chunker: Send + Sync {
    /// Split `text` into passage texts, in document order.
    ///
    /// Returns an empty `Vec` if the text contains nothing but whitespace.
    fn chunk(&self, text: &str) -> Vec<String>;
}

/// Splits text on blank lines (`"\n\n"`), trimming each segment and dropping
/// the ones that are empty after trimming.
///
/// `\r\n` line endings are treated as `\n`.
///
/// # Example
///
/// ```rust
/// use docqa_rag::{Chunker, ParagraphChunker};
///
/// let chunks = ParagraphChunker.chunk("first\n\n  second  \n\n\n");
/// assert_eq!(chunks, vec!["first", "second"]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ParagraphChunker;

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let normalized;
        let text = if text.contains('\r') {
            normalized = text.replace("\r\n", "\n");
            normalized.as_str()
        } else {
            text
        };

        text.split("\n\n")
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_blank_lines() {
        assert_eq!(ParagraphChunker.chunk("a\n\nb"), vec!["a", "b"]);
    }

    #[test]
    fn empty_document_has_no_chunks() {
        assert!(ParagraphChunker.chunk("").is_empty());
        assert!(ParagraphChunker.chunk(" \n\n \t\n\n").is_empty());
    }

    #[test]
    fn text_without_blank_lines_is_one_chunk() {
        assert_eq!(ParagraphChunker.chunk("only one para"), vec!["only one para"]);
        assert_eq!(ParagraphChunker.chunk("  line one\nline two \n"), vec!["line one\nline two"]);
    }

    #[test]
    fn windows_line_endings_split_like_unix() {
        assert_eq!(ParagraphChunker.chunk("a\r\n\r\nb\r\n"), vec!["a", "b"]);
    }
}
