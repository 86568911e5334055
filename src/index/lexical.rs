//! Lexical index: normalized token -> chunk postings.
//!
//! Built once per ingestion epoch. Postings are stored in deterministic
//! order (chunks are numbered in path order) so that identical snapshots
//! produce identical indexes.

use std::collections::HashMap;

use crate::models::ChunkId;

/// A token's occurrences in one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub chunk: ChunkId,
    pub frequency: u32,
}

/// Inverted index over chunk text and file paths.
#[derive(Debug, Default)]
pub struct LexicalIndex {
    postings: HashMap<String, Vec<Posting>>,
    /// Token count per chunk, indexed by `ChunkId.0`, for TF normalization.
    chunk_tokens: Vec<u32>,
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index one chunk's text plus its file path tokens.
    ///
    /// Must be called in ascending `ChunkId` order; ingestion guarantees
    /// this by numbering chunks as it walks files in sorted path order.
    pub fn add_chunk(&mut self, chunk: ChunkId, path: &str, text: &str) {
        debug_assert_eq!(chunk.0 as usize, self.chunk_tokens.len());

        let mut counts: HashMap<String, u32> = HashMap::new();
        let mut total = 0u32;
        for token in tokenize(text).chain(tokenize(path)) {
            *counts.entry(token).or_insert(0) += 1;
            total += 1;
        }
        self.chunk_tokens.push(total);

        for (token, frequency) in counts {
            self.postings.entry(token).or_default().push(Posting {
                chunk,
                frequency,
            });
        }
    }

    /// Postings for a token, in chunk order. Empty when the token is unseen.
    pub fn postings(&self, token: &str) -> &[Posting] {
        self.postings.get(token).map_or(&[], Vec::as_slice)
    }

    /// Token count of a chunk (text + path), used for TF normalization.
    pub fn chunk_token_count(&self, chunk: ChunkId) -> u32 {
        self.chunk_tokens.get(chunk.0 as usize).copied().unwrap_or(0)
    }

    /// Number of distinct tokens in the index.
    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }
}

/// Normalize text into lowercase alphanumeric tokens.
///
/// CamelCase identifiers are split at case transitions so `getUser`
/// matches the query token "user". Tokens shorter than 2 chars are
/// dropped.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .flat_map(split_camel)
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_lowercase())
}

/// Split a word at lower-to-upper case transitions.
fn split_camel(word: &str) -> Vec<&str> {
    if word.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut start = 0;
    let chars: Vec<(usize, char)> = word.char_indices().collect();
    for pair in chars.windows(2) {
        let (_, a) = pair[0];
        let (idx, b) = pair[1];
        if a.is_lowercase() && b.is_uppercase() {
            parts.push(&word[start..idx]);
            start = idx;
        }
    }
    parts.push(&word[start..]);
    parts
}
