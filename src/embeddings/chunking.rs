//! Text chunking for embeddings.
//!
//! Splits large text into overlapping windows for embedding generation.
//! `max_chars` is a hard upper bound per chunk; consecutive chunks
//! overlap by 10% of `max_chars` so retrieval keeps context at the
//! seams. Splits prefer word boundaries.
//!
//! The chunker is a lazy iterator: chunks materialize one at a time and
//! the embedding task can stop between them on cancellation.

/// A text chunk with its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Zero-based index of this chunk.
    pub index: usize,
    /// The chunk text.
    pub text: String,
}

/// Lazy iterator over the chunks of one text.
pub struct ChunkIter<'a> {
    text: &'a str,
    max_chars: usize,
    overlap: usize,
    start: usize,
    index: usize,
    done: bool,
}

/// Chunk `text` into windows of at most `max_chars` characters with a
/// 10% overlap.
///
/// Empty or whitespace-only text yields nothing. Text within the bound
/// yields a single chunk.
#[must_use]
pub fn chunk_text(text: &str, max_chars: usize) -> ChunkIter<'_> {
    let trimmed = text.trim();
    ChunkIter {
        text: trimmed,
        max_chars: max_chars.max(1),
        overlap: max_chars / 10,
        start: 0,
        index: 0,
        done: trimmed.is_empty(),
    }
}

impl Iterator for ChunkIter<'_> {
    type Item = TextChunk;

    fn next(&mut self) -> Option<TextChunk> {
        if self.done || self.start >= self.text.len() {
            return None;
        }

        let remaining = &self.text[self.start..];

        if remaining.len() <= self.max_chars {
            self.done = true;
            let chunk = TextChunk {
                index: self.index,
                text: remaining.to_string(),
            };
            self.index += 1;
            return Some(chunk);
        }

        // Cut at the last word boundary inside the window, keeping the
        // hard bound. Fall back to a raw cut on boundary-free text.
        let window_end = floor_char_boundary(remaining, self.max_chars);
        let cut = find_word_boundary(&remaining[..window_end]).unwrap_or(window_end);

        let chunk = TextChunk {
            index: self.index,
            text: remaining[..cut].to_string(),
        };
        self.index += 1;

        // Advance with overlap, always making progress on a char boundary
        let step = cut.saturating_sub(self.overlap).max(1);
        let mut advance = floor_char_boundary(remaining, step);
        if advance == 0 {
            advance = remaining
                .char_indices()
                .nth(1)
                .map_or(remaining.len(), |(i, _)| i);
        }
        self.start += advance;

        Some(chunk)
    }
}

/// Largest byte index ≤ `at` that is a char boundary.
fn floor_char_boundary(s: &str, at: usize) -> usize {
    if at >= s.len() {
        return s.len();
    }
    let mut i = at;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Position just after the last whitespace/punctuation in `window`,
/// ignoring a boundary in the first half (chunks should not collapse).
fn find_word_boundary(window: &str) -> Option<usize> {
    let min = window.len() / 2;
    window
        .char_indices()
        .rev()
        .find(|(i, c)| {
            *i >= min && (c.is_whitespace() || matches!(c, '.' | '!' | '?' | ';' | ',' | '\n'))
        })
        .map(|(i, c)| i + c.len_utf8())
}

/// Prepare a context item for embedding: category, key, and value in one
/// searchable string.
#[must_use]
pub fn prepare_item_text(key: &str, value: &str, category: &str) -> String {
    format!("[{category}] {key}: {value}")
}
