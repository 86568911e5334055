//! The response envelope returned to the caller.

use serde::{Deserialize, Serialize};

use super::evidence::{EvidenceId, EvidenceKind};

/// Terminal outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Answered,
    Insufficient,
    Failed,
}

/// A rendered citation: resolves to an evidence item from the request's
/// evidence set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub id: EvidenceId,
    pub kind: EvidenceKind,
    /// `path:start-end` for chunks, `#<number>` for issues/PRs, a path for
    /// file summaries.
    pub location: String,
    /// Short excerpt of the cited material.
    pub snippet: String,
}

/// What the orchestrator hands back when a request terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub answer: String,
    /// Ordered by first appearance in the evidence set.
    pub citations: Vec<Citation>,
    /// Unified diff extracted from a patch-mode answer. Pass-through only,
    /// never validated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    pub next_actions: Vec<String>,
    pub status: RequestStatus,
}

impl ResponseEnvelope {
    /// An `Insufficient` envelope: a literal limitation statement plus
    /// whatever partial evidence was gathered.
    pub fn insufficient(citations: Vec<Citation>) -> Self {
        Self {
            answer: "I could not gather enough evidence from the repository to answer \
                     this question. The partial evidence collected is listed below; \
                     try rephrasing the question or broadening its scope."
                .to_string(),
            citations,
            patch: None,
            next_actions: Vec::new(),
            status: RequestStatus::Insufficient,
        }
    }
}
