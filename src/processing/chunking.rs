//! Sliding-window chunking over extracted document text.
//!
//! Chunks are measured in characters. Each window is at most `chunk_size` characters long and
//! starts exactly `chunk_overlap` characters before the previous window ended, so adjacent chunks
//! share an identical overlap span and every character of the input lands in at least one chunk.
//!
//! Window ends prefer natural boundaries: the cut moves back to the latest paragraph break, then
//! line break, then whitespace found in the second half of the window. Text without any boundary
//! is cut at the hard limit.

use super::types::{Chunk, ChunkingError, SourceDocument};

/// Boundary classes tried in order when choosing where a window ends.
const BOUNDARIES: [Boundary; 3] = [Boundary::Paragraph, Boundary::Line, Boundary::Whitespace];

#[derive(Clone, Copy)]
enum Boundary {
    Paragraph,
    Line,
    Whitespace,
}

impl Boundary {
    /// Whether a cut placed at `end` (exclusive) lands right after this boundary.
    fn ends_at(self, chars: &[char], end: usize) -> bool {
        match self {
            Self::Paragraph => end >= 2 && chars[end - 1] == '\n' && chars[end - 2] == '\n',
            Self::Line => end >= 1 && chars[end - 1] == '\n',
            Self::Whitespace => end >= 1 && chars[end - 1].is_whitespace(),
        }
    }
}

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
///
/// Returns an empty vector when the input is empty or all whitespace.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    validate_parameters(chunk_size, overlap)?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::with_capacity(len / (chunk_size - overlap) + 1);
    let mut start = 0;

    loop {
        let hard_end = (start + chunk_size).min(len);
        if hard_end == len {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        let end = snap_end(&chars, start, hard_end, chunk_size, overlap);
        chunks.push(chars[start..end].iter().collect());
        start = end - overlap;
    }

    Ok(chunks)
}

/// Chunk a document, tagging every chunk with its filename and ordinal.
pub fn chunk_document(
    document: &SourceDocument,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkingError> {
    let chunks = chunk_text(&document.text, chunk_size, overlap)?
        .into_iter()
        .enumerate()
        .map(|(position, text)| Chunk {
            text,
            source: document.filename.clone(),
            position,
        })
        .collect();
    Ok(chunks)
}

fn validate_parameters(chunk_size: usize, overlap: usize) -> Result<(), ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkingError::InvalidOverlap {
            overlap,
            chunk_size,
        });
    }
    Ok(())
}

// The cut must leave at least one character past the overlap so the next window advances.
fn snap_end(chars: &[char], start: usize, hard_end: usize, size: usize, overlap: usize) -> usize {
    let min_end = (start + overlap + 1).max(start + size / 2);
    if min_end > hard_end {
        return hard_end;
    }
    BOUNDARIES
        .iter()
        .find_map(|boundary| {
            (min_end..=hard_end)
                .rev()
                .find(|&end| boundary.ends_at(chars, end))
        })
        .unwrap_or(hard_end)
}
