//! Boundary-aware overlapping text chunker.
//!
//! Splits document text into [`Chunk`]s that fit a model's input budget.
//! Text is whitespace-normalized up front; every chunk is then an exact
//! byte slice of the normalized text, tagged with its start offset, so the
//! original (normalized) document can be rebuilt with [`reassemble`].
//!
//! # Algorithm
//!
//! 1. Normalize whitespace (see [`normalize_whitespace`]).
//! 2. From the current start, look at the window of at most `chunk_size`
//!    bytes and pick the last split point in the back half of the window,
//!    preferring in order: paragraph break, line break, sentence end
//!    (`.`, `!`, `?` followed by a space), and finally a raw cut on a
//!    character boundary.
//! 3. The next chunk starts `overlap` bytes before the previous one ended,
//!    or right at its end when that would not move forward.
//! 4. The final chunk takes whatever remains.
//!
//! # Example
//!
//! ```rust
//! use study_forge_core::chunk::{chunk_text, reassemble};
//!
//! let text = "First paragraph.\n\nSecond paragraph is here.\n\nThird.";
//! let chunks = chunk_text(text, 30, 5);
//! assert!(chunks.len() > 1);
//! assert_eq!(reassemble(&chunks), text);
//! ```

use crate::models::Chunk;

/// Separators tried in priority order. Sentence ends are handled separately
/// because three punctuation marks compete for the same rank.
const PARAGRAPH_BREAK: &str = "\n\n";
const LINE_BREAK: &str = "\n";
const SENTENCE_ENDS: [&str; 3] = [". ", "! ", "? "];

/// Canonicalize whitespace before chunking.
///
/// - `\r\n` and `\r` become `\n`
/// - runs of spaces/tabs collapse to a single space
/// - spaces adjacent to a newline are dropped
/// - three or more consecutive newlines collapse to a paragraph break
/// - leading and trailing whitespace is removed
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    let mut pending_space = false;
    let mut prev_cr = false;

    for c in text.chars() {
        match c {
            '\n' if prev_cr => {
                prev_cr = false;
                continue;
            }
            '\n' | '\r' => {
                newlines += 1;
                pending_space = false;
            }
            c if c.is_whitespace() => {
                if newlines == 0 {
                    pending_space = true;
                }
            }
            c => {
                if !out.is_empty() {
                    if newlines >= 2 {
                        out.push_str(PARAGRAPH_BREAK);
                    } else if newlines == 1 {
                        out.push('\n');
                    } else if pending_space {
                        out.push(' ');
                    }
                }
                newlines = 0;
                pending_space = false;
                out.push(c);
            }
        }
        prev_cr = c == '\r';
    }

    out
}

/// Normalize `text` and split it into overlapping chunks of at most
/// `chunk_size` bytes.
///
/// `overlap` is clamped to `chunk_size - 1` so the chunker always makes
/// progress. Empty (or whitespace-only) input yields no chunks; input no
/// longer than `chunk_size` yields exactly one.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let normalized = normalize_whitespace(text);
    chunk_normalized(&normalized, chunk_size, overlap)
}

/// Split already-normalized text. Offsets refer to `text` itself.
pub fn chunk_normalized(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);

    let mut chunks = Vec::new();
    if text.is_empty() {
        return chunks;
    }

    let mut start = 0usize;
    loop {
        if text.len() - start <= chunk_size {
            chunks.push(Chunk {
                index: chunks.len(),
                start,
                text: text[start..].to_string(),
            });
            break;
        }

        let end = find_split(text, start, chunk_size, overlap);
        chunks.push(Chunk {
            index: chunks.len(),
            start,
            text: text[start..end].to_string(),
        });

        let next = floor_boundary(text, end.saturating_sub(overlap));
        start = if next > start { next } else { end };
    }

    chunks
}

/// Choose the end offset of the chunk starting at `start`.
///
/// The returned offset is greater than `start + overlap` unless a
/// multi-byte character straddles the limit, in which case the chunk ends
/// before that character and the next chunk starts at this chunk's end.
fn find_split(text: &str, start: usize, chunk_size: usize, overlap: usize) -> usize {
    let limit = floor_boundary(text, start + chunk_size);
    let min_end = (start + overlap + 1).max(start + chunk_size / 2);

    if limit > start {
        let window = &text[start..limit];

        for sep in [PARAGRAPH_BREAK, LINE_BREAK] {
            if let Some(pos) = window.rfind(sep) {
                let end = start + pos + sep.len();
                if end >= min_end {
                    return end;
                }
            }
        }

        let sentence_end = SENTENCE_ENDS
            .iter()
            .filter_map(|sep| window.rfind(sep).map(|pos| start + pos + sep.len()))
            .max();
        if let Some(end) = sentence_end {
            if end >= min_end {
                return end;
            }
        }

        // Below `min_end` only when a multi-byte char straddles the limit.
        return limit;
    }

    // A single char is wider than `chunk_size`.
    ceil_boundary(text, start + 1)
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Rebuild the normalized document from its chunks by dropping the
/// overlapping prefix of each chunk.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;

    for chunk in chunks {
        let end = chunk.end();
        if end <= covered {
            continue;
        }
        let skip = covered.saturating_sub(chunk.start);
        out.push_str(&chunk.text[skip..]);
        covered = end;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> String {
        (0..40)
            .map(|i| {
                format!(
                    "Paragraph {} explains photosynthesis. Light is absorbed by chlorophyll! Why does it matter? Plants grow.\nA second line follows here.",
                    i
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", 100, 10).is_empty());
        assert!(chunk_text("  \n\n\t ", 100, 10).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_normalize_whitespace() {
        let raw = "  Title\r\n\r\n\r\n\tBody   text \t here.  \n  next line\n\n\n\nEnd  ";
        assert_eq!(
            normalize_whitespace(raw),
            "Title\n\nBody text here.\nnext line\n\nEnd"
        );
    }

    #[test]
    fn test_reassemble_is_lossless() {
        let doc = sample_document();
        let normalized = normalize_whitespace(&doc);
        for (size, overlap) in [(200, 20), (500, 100), (64, 0), (1000, 900), (37, 5)] {
            let chunks = chunk_text(&doc, size, overlap);
            assert_eq!(
                reassemble(&chunks),
                normalized,
                "size={} overlap={}",
                size,
                overlap
            );
        }
    }

    #[test]
    fn test_chunks_respect_size() {
        let doc = sample_document();
        let chunks = chunk_text(&doc, 300, 40);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 300, "chunk {} is {} bytes", c.index, c.text.len());
        }
    }

    #[test]
    fn test_chunks_overlap_and_are_contiguous() {
        let doc = sample_document();
        let chunks = chunk_text(&doc, 300, 40);
        for (i, pair) in chunks.windows(2).enumerate() {
            assert_eq!(pair[0].index, i);
            assert!(pair[1].start > pair[0].start);
            assert!(pair[1].start <= pair[0].end(), "gap between chunks {}", i);
        }
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let text = "Alpha alpha alpha alpha.\n\nBeta beta beta beta.\n\nGamma gamma gamma.";
        let chunks = chunk_text(text, 50, 0);
        assert_eq!(chunks[0].text, "Alpha alpha alpha alpha.\n\nBeta beta beta beta.\n\n");
        assert_eq!(chunks[1].text, "Gamma gamma gamma.");
    }

    #[test]
    fn test_falls_back_to_sentence_then_raw_cut() {
        let text = "One sentence here. Another sentence there. And one more to finish.";
        let chunks = chunk_text(text, 30, 0);
        assert_eq!(chunks[0].text, "One sentence here. ");

        let unbroken = "x".repeat(95);
        let raw = chunk_text(&unbroken, 30, 0);
        assert_eq!(raw.len(), 4);
        assert_eq!(raw[0].text.len(), 30);
        assert_eq!(raw[3].text.len(), 5);
    }

    #[test]
    fn test_overlap_is_clamped() {
        let text = "abcdefghij".repeat(10);
        let chunks = chunk_text(&text, 10, 50);
        assert!(!chunks.is_empty());
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_multibyte_text_never_splits_a_char() {
        let text = "Ünïcödé tëxt wïth äccents. ".repeat(20);
        let chunks = chunk_text(&text, 25, 4);
        assert_eq!(reassemble(&chunks), normalize_whitespace(&text));
    }

    #[test]
    fn test_wide_chars_with_large_overlap_stay_within_size() {
        for text in ["ab日本語x本", "a\n\n日本の文です。", "日本語の文章です"] {
            let chunks = chunk_text(text, 3, 2);
            for c in &chunks {
                assert!(c.text.len() <= 3, "chunk {:?} is {} bytes", c.text, c.text.len());
            }
            assert_eq!(reassemble(&chunks), normalize_whitespace(text));
        }

        let chunks = chunk_text("ab日本語", 3, 2);
        assert_eq!(chunks[0].text, "ab");
        assert_eq!(chunks[1].text, "日");
    }

    #[test]
    fn test_char_wider_than_chunk_size() {
        let chunks = chunk_text("a😀b", 2, 1);
        assert_eq!(reassemble(&chunks), "a😀b");
        assert!(chunks.iter().any(|c| c.text == "😀"));
    }

    #[test]
    fn test_deterministic() {
        let doc = sample_document();
        assert_eq!(chunk_text(&doc, 250, 30), chunk_text(&doc, 250, 30));
    }
}
