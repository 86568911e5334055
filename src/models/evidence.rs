//! Evidence items and the per-request evidence set.
//!
//! An [`EvidenceItem`] is the unit of citation: a tagged reference back to
//! a chunk, a file summary, an issue, or a pull request, together with the
//! provenance of the tool call that produced it. The [`EvidenceSet`] is
//! append-only within a request and enumerates in insertion order so that
//! citation listings are deterministic.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::repo::{ChunkId, EpochId};

/// Identifier of an evidence item within one request ("e1", "e2", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceId(pub String);

impl std::fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What class of source an evidence item points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Chunk,
    FileSummary,
    Issue,
    PullRequest,
}

/// Reference to the underlying source object.
///
/// A closed set of variants with exhaustive handling at each consumer;
/// never an untyped map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRef {
    Chunk(ChunkId),
    /// A file-level summary, keyed by repo-relative path.
    File(String),
    Issue(u64),
    PullRequest(u64),
}

impl SourceRef {
    pub fn kind(&self) -> EvidenceKind {
        match self {
            SourceRef::Chunk(_) => EvidenceKind::Chunk,
            SourceRef::File(_) => EvidenceKind::FileSummary,
            SourceRef::Issue(_) => EvidenceKind::Issue,
            SourceRef::PullRequest(_) => EvidenceKind::PullRequest,
        }
    }
}

/// Which tool call produced an item, and at what rank in its result list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub tool: super::ToolName,
    pub rank: usize,
}

/// The unit of citation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: EvidenceId,
    pub source: SourceRef,
    /// Epoch the source was resolved under when the item was minted.
    pub epoch: EpochId,
    /// Human-readable text shown to the reasoning engine and in citations.
    pub display: String,
    pub provenance: Provenance,
    pub score: f64,
}

impl EvidenceItem {
    pub fn kind(&self) -> EvidenceKind {
        self.source.kind()
    }
}

/// Append-only, insertion-ordered collection of evidence for one request.
///
/// Duplicate source references collapse onto the first item's id, so a
/// chunk surfaced by both `search_repo` and `open_file` is cited once.
#[derive(Debug, Default)]
pub struct EvidenceSet {
    items: IndexMap<EvidenceId, EvidenceItem>,
    by_source: HashMap<SourceRef, EvidenceId>,
    next: usize,
}

impl EvidenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item, or return the existing id if this source reference
    /// was already recorded.
    pub fn put(
        &mut self,
        source: SourceRef,
        epoch: EpochId,
        display: String,
        provenance: Provenance,
        score: f64,
    ) -> EvidenceId {
        if let Some(existing) = self.by_source.get(&source) {
            return existing.clone();
        }
        self.next += 1;
        let id = EvidenceId(format!("e{}", self.next));
        self.by_source.insert(source.clone(), id.clone());
        self.items.insert(
            id.clone(),
            EvidenceItem {
                id: id.clone(),
                source,
                epoch,
                display,
                provenance,
                score,
            },
        );
        id
    }

    pub fn get(&self, id: &EvidenceId) -> Option<&EvidenceItem> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &EvidenceId) -> bool {
        self.items.contains_key(id)
    }

    /// Items in insertion (provenance) order.
    pub fn iter(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Best score among items of the given kind, if any exist.
    pub fn best_score(&self, kind: EvidenceKind) -> Option<f64> {
        self.iter()
            .filter(|i| i.kind() == kind)
            .map(|i| i.score)
            .fold(None, |best, s| Some(best.map_or(s, |b: f64| b.max(s))))
    }

    pub fn count_of(&self, kind: EvidenceKind) -> usize {
        self.iter().filter(|i| i.kind() == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolName;

    fn put_chunk(set: &mut EvidenceSet, epoch: EpochId, chunk: u32, score: f64) -> EvidenceId {
        set.put(
            SourceRef::Chunk(ChunkId(chunk)),
            epoch,
            format!("chunk {chunk}"),
            Provenance {
                tool: ToolName::SearchRepo,
                rank: 0,
            },
            score,
        )
    }

    #[test]
    fn put_assigns_sequential_ids() {
        let epoch = EpochId::new();
        let mut set = EvidenceSet::new();
        assert_eq!(put_chunk(&mut set, epoch, 1, 1.0).0, "e1");
        assert_eq!(put_chunk(&mut set, epoch, 2, 1.0).0, "e2");
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn put_is_idempotent_on_source() {
        let epoch = EpochId::new();
        let mut set = EvidenceSet::new();
        let a = put_chunk(&mut set, epoch, 7, 1.0);
        let b = put_chunk(&mut set, epoch, 7, 2.0);
        assert_eq!(a, b);
        assert_eq!(set.len(), 1);
        // First item wins; no mutation on the duplicate put.
        assert_eq!(set.get(&a).unwrap().score, 1.0);
    }

    #[test]
    fn iter_preserves_insertion_order() {
        let epoch = EpochId::new();
        let mut set = EvidenceSet::new();
        put_chunk(&mut set, epoch, 3, 0.1);
        put_chunk(&mut set, epoch, 1, 0.9);
        put_chunk(&mut set, epoch, 2, 0.5);
        let ids: Vec<_> = set.iter().map(|i| i.id.0.clone()).collect();
        assert_eq!(ids, vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn best_score_per_kind() {
        let epoch = EpochId::new();
        let mut set = EvidenceSet::new();
        put_chunk(&mut set, epoch, 1, 0.4);
        put_chunk(&mut set, epoch, 2, 0.9);
        set.put(
            SourceRef::Issue(12),
            epoch,
            "issue".into(),
            Provenance {
                tool: ToolName::GetIssues,
                rank: 0,
            },
            0.0,
        );
        assert_eq!(set.best_score(EvidenceKind::Chunk), Some(0.9));
        assert_eq!(set.best_score(EvidenceKind::PullRequest), None);
        assert_eq!(set.count_of(EvidenceKind::Issue), 1);
    }
}
