//! The per-request evidence store.
//!
//! Wraps the request's [`EvidenceSet`] together with the index snapshot it
//! was built against. Every resolution back to source material is epoch
//! checked: if the cited epoch differs from the store's snapshot the
//! citation is stale and resolution fails rather than returning text from
//! a different repository state.

use std::sync::Arc;

use thiserror::Error;

use crate::index::RepoIndex;
use crate::models::{
    Citation, ChunkId, EpochId, EvidenceId, EvidenceItem, Issue, Provenance, PullRequest,
    SourceRef,
};
use crate::oracle::EvidenceBlock;

/// Max characters of a citation snippet.
const SNIPPET_CHARS: usize = 200;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unknown evidence id: {0}")]
    UnknownEvidence(EvidenceId),

    #[error("citation {id} is stale: cites epoch {cited}, current epoch is {current}")]
    CitationStale {
        id: EvidenceId,
        cited: EpochId,
        current: EpochId,
    },

    #[error("chunk {0} not found in the current index")]
    UnknownChunk(ChunkId),

    #[error("file not found in the current index: {0}")]
    UnknownFile(String),
}

/// Evidence collected during one request, bound to one index epoch.
pub struct EvidenceStore {
    index: Arc<RepoIndex>,
    set: crate::models::EvidenceSet,
}

impl EvidenceStore {
    pub fn new(index: Arc<RepoIndex>) -> Self {
        Self {
            index,
            set: crate::models::EvidenceSet::new(),
        }
    }

    pub fn index(&self) -> &RepoIndex {
        &self.index
    }

    pub fn set(&self) -> &crate::models::EvidenceSet {
        &self.set
    }

    pub fn contains(&self, id: &EvidenceId) -> bool {
        self.set.contains(id)
    }

    /// Record a chunk as evidence. Resolves the chunk text immediately so
    /// the display never drifts from the snapshot.
    pub fn add_chunk(
        &mut self,
        chunk: ChunkId,
        provenance: Provenance,
        score: f64,
    ) -> Result<EvidenceId, StoreError> {
        let resolved = self
            .index
            .chunk(chunk)
            .ok_or(StoreError::UnknownChunk(chunk))?;
        let display = resolved.text.clone();
        let epoch = self.index.epoch();
        Ok(self
            .set
            .put(SourceRef::Chunk(chunk), epoch, display, provenance, score))
    }

    /// Record a file-level summary (path, size, line count, tag) as evidence.
    pub fn add_file_summary(
        &mut self,
        path: &str,
        provenance: Provenance,
        score: f64,
    ) -> Result<EvidenceId, StoreError> {
        let file = self
            .index
            .file(path)
            .ok_or_else(|| StoreError::UnknownFile(path.to_string()))?;
        let mut display = format!(
            "{} ({} lines, {} bytes)",
            file.path, file.num_lines, file.size_bytes
        );
        if let Some(tag) = &file.tag {
            display.push_str(&format!(" - {tag}"));
        }
        let epoch = self.index.epoch();
        Ok(self.set.put(
            SourceRef::File(path.to_string()),
            epoch,
            display,
            provenance,
            score,
        ))
    }

    /// Record an issue as evidence.
    pub fn add_issue(&mut self, issue: &Issue, provenance: Provenance) -> EvidenceId {
        let display = format!(
            "issue #{} [{}]: {}\n{}",
            issue.number, issue.state, issue.title, issue.body
        );
        let epoch = self.index.epoch();
        self.set
            .put(SourceRef::Issue(issue.number), epoch, display, provenance, 0.0)
    }

    /// Record a pull request as evidence.
    pub fn add_pull_request(&mut self, pr: &PullRequest, provenance: Provenance) -> EvidenceId {
        let display = format!(
            "PR #{} [{}]: {}\n{}",
            pr.number, pr.state, pr.title, pr.body
        );
        let epoch = self.index.epoch();
        self.set.put(
            SourceRef::PullRequest(pr.number),
            epoch,
            display,
            provenance,
            0.0,
        )
    }

    /// Resolve an evidence id back to its item, failing on unknown ids and
    /// on epoch mismatches.
    pub fn resolve(&self, id: &EvidenceId) -> Result<&EvidenceItem, StoreError> {
        let item = self
            .set
            .get(id)
            .ok_or_else(|| StoreError::UnknownEvidence(id.clone()))?;
        let current = self.index.epoch();
        if item.epoch != current {
            return Err(StoreError::CitationStale {
                id: id.clone(),
                cited: item.epoch,
                current,
            });
        }
        Ok(item)
    }

    /// Human-readable location of an evidence item.
    pub fn location(&self, item: &EvidenceItem) -> String {
        match &item.source {
            SourceRef::Chunk(chunk) => match self.index.chunk(*chunk) {
                Some(c) => format!("{}:{}-{}", c.file_path, c.start_line, c.end_line),
                None => format!("{chunk}"),
            },
            SourceRef::File(path) => path.clone(),
            SourceRef::Issue(n) => format!("issue #{n}"),
            SourceRef::PullRequest(n) => format!("PR #{n}"),
        }
    }

    /// Render one evidence item as a citation.
    pub fn citation(&self, item: &EvidenceItem) -> Citation {
        Citation {
            id: item.id.clone(),
            kind: item.kind(),
            location: self.location(item),
            snippet: snippet(&item.display),
        }
    }

    /// All citations, in evidence insertion order.
    pub fn citations(&self) -> Vec<Citation> {
        self.set.iter().map(|item| self.citation(item)).collect()
    }

    /// Evidence rendered for the synthesis prompt, in insertion order.
    pub fn blocks(&self) -> Vec<EvidenceBlock> {
        self.set
            .iter()
            .map(|item| EvidenceBlock {
                id: item.id.clone(),
                location: self.location(item),
                text: item.display.clone(),
            })
            .collect()
    }
}

/// First line(s) of the display text, capped at a character budget.
fn snippet(display: &str) -> String {
    let first = display.lines().next().unwrap_or("");
    if first.chars().count() <= SNIPPET_CHARS {
        first.to_string()
    } else {
        let cut: String = first.chars().take(SNIPPET_CHARS).collect();
        format!("{cut}...")
    }
}
