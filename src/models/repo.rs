//! Repository, file, and chunk records produced by ingestion.
//!
//! All of these are immutable once built. Re-ingestion replaces the whole
//! structure under a new epoch rather than mutating in place.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one ingestion of a repository. Every evidence item carries
/// the epoch it was minted under; resolving against a different epoch is a
/// stale-citation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpochId(pub Uuid);

impl EpochId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EpochId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EpochId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a chunk within its epoch's chunk table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub u32);

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chunk_{:05}", self.0)
    }
}

/// A line-bounded citable unit of a file.
///
/// Lines are 1-indexed and inclusive; `start_line <= end_line` always
/// holds. Chunks of a file are non-overlapping, ordered, and cover it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    /// Path of the owning file, relative to the repository root.
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    /// Short generated summary tag, if tag generation ran and succeeded.
    pub tag: Option<String>,
}

/// Metadata for one file in the repository snapshot.
///
/// Binary files carry metadata only: no chunks and no lexical postings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    /// Lowercased extension without the dot, empty when there is none.
    pub extension: String,
    pub size_bytes: u64,
    /// First 16 hex chars of the sha256 of the content.
    pub content_hash: String,
    pub num_lines: usize,
    pub is_binary: bool,
    /// Chunk ids in file order. Empty for binary files.
    pub chunk_ids: Vec<ChunkId>,
    /// Short generated summary tag, if available.
    pub tag: Option<String>,
}

impl FileRecord {
    /// Directory depth of the path (`src/a/b.rs` has depth 2).
    pub fn depth(&self) -> usize {
        self.path.matches('/').count()
    }

    /// Whether this file looks like documentation rather than code.
    pub fn is_doc(&self) -> bool {
        matches!(self.extension.as_str(), "md" | "rst" | "txt" | "adoc")
            || self.path.to_lowercase().starts_with("docs/")
    }
}

/// One ingested repository snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub epoch: EpochId,
    pub root: PathBuf,
    /// Seconds since the Unix epoch at ingestion time.
    pub indexed_at: u64,
    pub total_files: usize,
    pub total_chunks: usize,
}
