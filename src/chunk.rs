//! Token-budgeted text chunker.
//!
//! Splits extracted document text into [`Chunk`]s sized for a model's
//! context window. The token budget is converted to a character budget with
//! a fixed ratio; this is an estimate, not real tokenization.
//!
//! Each cut is proposed `max_chars` characters after the previous one. If
//! that lands inside the text, the chunker cuts just after the last newline
//! or period at or before the proposed cut, provided it lies more than
//! [`MIN_BREAK_DISTANCE`] characters after the chunk start. Otherwise the
//! hard boundary is used. Each chunk costs at most one pass over its window.
//!
//! Slices are trimmed and empty slices dropped, so the chunks in order
//! reconstruct the source text modulo whitespace at the cut points.

use crate::models::Chunk;

/// Approximate chars-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// A natural break closer than this to the chunk start is ignored.
pub const MIN_BREAK_DISTANCE: usize = 50;

/// Rough token count for `text` (`ceil(chars / 4)`).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Split `text` into ordered, non-empty chunks of at most roughly
/// `max_tokens` tokens. A `max_tokens` of zero is treated as one.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < text.len() {
        let end = start + next_cut(&text[start..], max_chars);
        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(Chunk {
                index: chunks.len(),
                text: piece.to_string(),
            });
        }
        start = end;
    }

    chunks
}

/// Byte length of the next slice of `rest`.
///
/// Only the first `max_chars + 1` characters are visited: the proposed cut
/// sits at character `max_chars`, and a break at or before it counts only
/// when it lies past [`MIN_BREAK_DISTANCE`].
fn next_cut(rest: &str, max_chars: usize) -> usize {
    let mut hard_cut = None;
    let mut last_break = None;

    for (n, (i, c)) in rest.char_indices().take(max_chars + 1).enumerate() {
        if n == max_chars {
            hard_cut = Some(i);
        }
        if n > MIN_BREAK_DISTANCE && (c == '\n' || c == '.') {
            last_break = Some(i + c.len_utf8());
        }
    }

    match hard_cut {
        None => rest.len(),
        Some(cut) => last_break.unwrap_or(cut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", 2500).is_empty());
        assert!(chunk_text("   \n\t  ", 2500).is_empty());
    }

    #[test]
    fn test_small_text_single_trimmed_chunk() {
        let chunks = chunk_text("  Hello, world!\n", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_hard_cut_without_breaks() {
        // max_tokens=25 => 100 chars, no newline or period anywhere
        let text = "a".repeat(250);
        let chunks = chunk_text(&text, 25);
        let lens: Vec<usize> = chunks.iter().map(|c| c.text.len()).collect();
        assert_eq!(lens, vec![100, 100, 50]);
    }

    #[test]
    fn test_cuts_after_period() {
        // 80 chars of sentence, a period, then filler; budget 100 chars
        let first = format!("{}.", "x".repeat(79));
        let text = format!("{} {}", first, "y".repeat(150));
        let chunks = chunk_text(&text, 25);
        assert_eq!(chunks[0].text, first);
        assert!(chunks[1].text.starts_with('y'));
    }

    #[test]
    fn test_break_too_close_to_start_is_ignored() {
        // period at index 10 is within MIN_BREAK_DISTANCE of the start
        let text = format!("{}.{}", "a".repeat(10), "b".repeat(200));
        let chunks = chunk_text(&text, 25);
        assert_eq!(chunks[0].text.chars().count(), 100);
    }

    #[test]
    fn test_newline_break_preferred_when_last() {
        let text = format!("{}.{}\n{}", "a".repeat(60), "b".repeat(20), "c".repeat(100));
        let chunks = chunk_text(&text, 25);
        // newline at index 81 is the last break before the 100-char cut
        assert_eq!(chunks[0].text, format!("{}.{}", "a".repeat(60), "b".repeat(20)));
    }

    #[test]
    fn test_indices_contiguous() {
        let text = (0..200)
            .map(|i| format!("Clause number {} applies to the vendor.", i))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunk_text(&text, 50);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn test_multibyte_text_does_not_split_chars() {
        let text = "é".repeat(500);
        let chunks = chunk_text(&text, 25);
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.text.chars().count() == 100));
    }

    #[test]
    fn test_large_text_without_breaks() {
        let text = "a".repeat(4_000_000);
        let chunks = chunk_text(&text, 2500);
        assert_eq!(chunks.len(), 400);
        assert!(chunks.iter().all(|c| c.text.len() == 10_000));
        assert_eq!(chunks[399].index, 399);
    }

    #[test]
    fn test_break_exactly_at_proposed_cut_is_kept() {
        // char 100 is the proposed cut for a 100-char budget
        let text = format!("{}.{}", "a".repeat(100), "b".repeat(50));
        let chunks = chunk_text(&text, 25);
        assert_eq!(chunks[0].text, format!("{}.", "a".repeat(100)));
        assert_eq!(chunks[1].text, "b".repeat(50));
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    fn strip_ws(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    proptest! {
        #[test]
        fn prop_chunks_reconstruct_source(
            text in "[a-z .\n]{0,2000}",
            max_tokens in 1usize..200,
        ) {
            let chunks = chunk_text(&text, max_tokens);
            let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
            prop_assert_eq!(strip_ws(&joined), strip_ws(&text));
        }

        #[test]
        fn prop_chunks_bounded_and_non_empty(
            text in "[a-zA-Z .\n]{0,2000}",
            max_tokens in 1usize..200,
        ) {
            let max_chars = max_tokens * CHARS_PER_TOKEN;
            for c in chunk_text(&text, max_tokens) {
                prop_assert!(!c.text.is_empty());
                // a break found exactly at the proposed cut is included
                prop_assert!(c.text.chars().count() <= max_chars + 1);
            }
        }

        #[test]
        fn prop_short_text_single_chunk(text in "[a-z][a-z .\n]{0,98}[a-z]") {
            let chunks = chunk_text(&text, 25);
            prop_assert_eq!(chunks.len(), 1);
            prop_assert_eq!(chunks[0].text.as_str(), text.trim());
        }
    }
}
