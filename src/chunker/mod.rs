
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DocQaError, Result};

/// Configuration for document chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

/// Boundary preference when deciding where a chunk ends, strongest first
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Split text into overlapping chunks of at most `chunk_size` characters.
///
/// Consecutive chunks share exactly `overlap` characters: each window starts
/// `overlap` characters before the previous window's end, so concatenating
/// the first chunk with every later chunk minus its leading `overlap`
/// characters reconstructs the input. The final chunk may be shorter and has
/// no trailing overlap. Deterministic for a given input and configuration.
#[inline]
pub fn split(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    if config.chunk_size == 0 {
        return Err(DocQaError::InvalidInput(
            "chunk_size must be greater than zero".to_string(),
        ));
    }
    if config.overlap >= config.chunk_size {
        return Err(DocQaError::InvalidInput(format!(
            "overlap ({}) must be smaller than chunk_size ({})",
            config.overlap, config.chunk_size
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let hard_end = (start + config.chunk_size).min(chars.len());
        let end = if hard_end < chars.len() {
            snap_to_boundary(&chars, start, hard_end, config.overlap)
        } else {
            hard_end
        };

        chunks.push(chars[start..end].iter().collect());

        if end == chars.len() {
            break;
        }
        start = end - config.overlap;
    }

    debug!(
        "split {} characters into {} chunks (chunk_size={}, overlap={})",
        chars.len(),
        chunks.len(),
        config.chunk_size,
        config.overlap
    );

    Ok(chunks)
}

/// Find the latest end position in the window that lands just after a natural
/// boundary, preferring paragraph breaks over line breaks over spaces.
///
/// The search is confined to the trailing `overlap` characters of the window
/// and never shrinks the chunk below `overlap + 1` characters, which keeps
/// every window making forward progress. Falls back to the hard cut when no
/// boundary is in range.
fn snap_to_boundary(chars: &[char], start: usize, hard_end: usize, overlap: usize) -> usize {
    let floor = (start + overlap + 1).max(hard_end.saturating_sub(overlap.max(1)));

    for separator in SEPARATORS {
        let sep_chars: Vec<char> = separator.chars().collect();
        let mut end = hard_end;
        while end >= floor {
            if end >= sep_chars.len() && chars[end - sep_chars.len()..end] == sep_chars[..] {
                return end;
            }
            end -= 1;
        }
    }

    hard_end
}
