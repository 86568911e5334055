//! Repository ingestion: walk, chunk, and index a snapshot.
//!
//! `ingest` walks the repository once, records file metadata, splits text
//! files into citable chunks, and builds the lexical index. The result is
//! immutable; re-ingesting produces a fresh [`RepoIndex`] under a new
//! epoch.

pub mod chunker;
pub mod lexical;
pub mod tags;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::IndexConfig;
use crate::models::{Chunk, ChunkId, EpochId, FileRecord, Repository};

use lexical::LexicalIndex;

/// Errors that abort ingestion entirely. Per-file problems never do; they
/// are reported as skips instead.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("repository root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("repository root is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Directory names excluded from the walk on top of gitignore rules.
const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".venv",
    "venv",
    "__pycache__",
    "build",
    "dist",
    ".next",
    "coverage",
    ".pytest_cache",
    "target",
];

/// Extensions always treated as binary (metadata only, no chunks).
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "ico", "pdf", "zip", "tar", "gz", "exe", "dll", "so",
    "dylib", "lock", "pyc", "pyo", "class", "jar", "woff", "woff2", "ttf",
];

/// One skipped file and why.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Non-fatal ingestion outcome details.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub skipped: Vec<SkippedFile>,
}

/// The complete index for one ingestion epoch.
///
/// Shared read-only across concurrent tool calls; replaced wholesale on
/// re-ingestion.
#[derive(Debug)]
pub struct RepoIndex {
    pub repo: Repository,
    /// Sorted by path.
    files: Vec<FileRecord>,
    by_path: HashMap<String, usize>,
    /// Indexed by `ChunkId.0`.
    chunks: Vec<Chunk>,
    pub lexical: LexicalIndex,
    /// Directory path -> rolled-up tag, when tag generation ran.
    pub dir_tags: HashMap<String, String>,
}

impl RepoIndex {
    pub fn epoch(&self) -> EpochId {
        self.repo.epoch
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn file(&self, path: &str) -> Option<&FileRecord> {
        self.by_path.get(path).map(|&i| &self.files[i])
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(id.0 as usize)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Exact text of a 1-indexed inclusive line range, reconstructed from
    /// the epoch's chunks so it never reflects on-disk edits made after
    /// ingestion. `None` when the path is unknown, the file is binary, or
    /// the range is out of bounds.
    pub fn span_text(&self, path: &str, start: usize, end: usize) -> Option<String> {
        let file = self.file(path)?;
        if file.is_binary || start == 0 || start > end || end > file.num_lines {
            return None;
        }
        let mut out: Vec<&str> = Vec::with_capacity(end - start + 1);
        for &chunk_id in &file.chunk_ids {
            let chunk = self.chunk(chunk_id)?;
            if chunk.end_line < start {
                continue;
            }
            if chunk.start_line > end {
                break;
            }
            for (offset, line) in chunk.text.lines().enumerate() {
                let line_no = chunk.start_line + offset;
                if line_no >= start && line_no <= end {
                    out.push(line);
                }
            }
        }
        Some(out.join("\n"))
    }

    /// Attach a generated tag to a file and its chunks.
    pub(crate) fn set_file_tag(&mut self, path: &str, tag: String) {
        if let Some(&i) = self.by_path.get(path) {
            for &chunk_id in &self.files[i].chunk_ids {
                self.chunks[chunk_id.0 as usize].tag = Some(tag.clone());
            }
            self.files[i].tag = Some(tag);
        }
    }
}

/// Walk and index the repository at `root`.
///
/// Unreadable files are skipped with a warning in the report; an empty
/// repository succeeds with zero files.
pub fn ingest(root: &Path, config: &IndexConfig) -> Result<(RepoIndex, IngestReport), IngestError> {
    if !root.exists() {
        return Err(IngestError::RootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(IngestError::NotADirectory(root.to_path_buf()));
    }

    let mut report = IngestReport::default();
    let mut paths = collect_paths(root, config);
    // Sorted walk keeps chunk numbering and the lexical index deterministic
    paths.sort();

    let mut files = Vec::new();
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut lexical = LexicalIndex::new();

    for abs in paths {
        let rel = match abs.strip_prefix(root) {
            Ok(p) => p.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        match index_file(&abs, &rel, config, &mut chunks, &mut lexical) {
            Ok(record) => files.push(record),
            Err(reason) => report.skipped.push(SkippedFile { path: rel, reason }),
        }
    }

    let by_path = files
        .iter()
        .enumerate()
        .map(|(i, f)| (f.path.clone(), i))
        .collect();

    let repo = Repository {
        epoch: EpochId::new(),
        root: root.to_path_buf(),
        indexed_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        total_files: files.len(),
        total_chunks: chunks.len(),
    };

    Ok((
        RepoIndex {
            repo,
            files,
            by_path,
            chunks,
            lexical,
            dir_tags: HashMap::new(),
        },
        report,
    ))
}

/// Gitignore-aware walk with the explicit exclusion set applied.
fn collect_paths(root: &Path, config: &IndexConfig) -> Vec<PathBuf> {
    // Owned so the filter closure can satisfy the walker's 'static bound
    let excluded: Vec<String> = EXCLUDED_DIRS
        .iter()
        .map(|d| d.to_string())
        .chain(config.exclude_dirs.iter().cloned())
        .collect();

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .filter_entry(move |entry| {
            let name = entry.file_name().to_string_lossy();
            !excluded.iter().any(|d| *d == name.as_ref())
        })
        .build();

    walker
        .flatten()
        .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()))
        .map(|e| e.into_path())
        .collect()
}

/// Index a single file: metadata always, chunks and postings for text files.
fn index_file(
    abs: &Path,
    rel: &str,
    config: &IndexConfig,
    chunks: &mut Vec<Chunk>,
    lexical: &mut LexicalIndex,
) -> Result<FileRecord, String> {
    let metadata = std::fs::metadata(abs).map_err(|e| format!("cannot stat: {e}"))?;

    let extension = abs
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let bytes = std::fs::read(abs).map_err(|e| format!("cannot read: {e}"))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let content_hash = hex::encode(&hasher.finalize()[..8]);

    let content = if BINARY_EXTENSIONS.contains(&extension.as_str()) || bytes.contains(&0) {
        None
    } else {
        String::from_utf8(bytes).ok()
    };
    let Some(content) = content else {
        return Ok(FileRecord {
            path: rel.to_string(),
            extension,
            size_bytes: metadata.len(),
            content_hash,
            num_lines: 0,
            is_binary: true,
            chunk_ids: Vec::new(),
            tag: None,
        });
    };
    let lines: Vec<&str> = content.lines().collect();

    let mut chunk_ids = Vec::new();
    for (start, end) in chunker::chunk_ranges(&lines, config) {
        let id = ChunkId(chunks.len() as u32);
        let text = lines[start - 1..end].join("\n");
        lexical.add_chunk(id, rel, &text);
        chunks.push(Chunk {
            id,
            file_path: rel.to_string(),
            start_line: start,
            end_line: end,
            text,
            tag: None,
        });
        chunk_ids.push(id);
    }

    Ok(FileRecord {
        path: rel.to_string(),
        extension,
        size_bytes: metadata.len(),
        content_hash,
        num_lines: lines.len(),
        is_binary: false,
        chunk_ids,
        tag: None,
    })
}
