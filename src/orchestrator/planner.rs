//! Intent-driven tool plans.
//!
//! A plan is a sequence of stages; calls within a stage are independent
//! and may run concurrently, stages run in order. Dependent calls (open a
//! file found by search) are not planned up front; the orchestrator asks
//! for follow-ups once earlier results exist.

use crate::evidence::EvidenceStore;
use crate::gateway::ToolCall;
use crate::models::{EvidenceKind, Intent, RemoteFilters, RemoteState, Scope, SourceRef};
use crate::retriever::SearchFilters;

/// Issues/PRs requested per remote call.
const REMOTE_LIMIT: usize = 20;

/// Files opened as follow-ups after a search stage.
const FOLLOW_UP_FILES: usize = 2;

#[derive(Debug, Default)]
pub struct Plan {
    pub stages: Vec<Vec<ToolCall>>,
}

/// Template the initial plan for a classified query.
pub fn initial_plan(intent: Intent, query: &str, scope: Scope, top_k: usize) -> Plan {
    let search = ToolCall::SearchRepo {
        query: query.to_string(),
        filters: SearchFilters::default(),
        top_k,
    };
    let docs_search = ToolCall::SearchRepo {
        query: query.to_string(),
        filters: SearchFilters {
            docs_only: true,
            ..Default::default()
        },
        top_k,
    };
    let issues = ToolCall::GetIssues(RemoteFilters {
        state: RemoteState::Open,
        limit: REMOTE_LIMIT,
        ..Default::default()
    });
    let pulls = ToolCall::GetPullRequests(RemoteFilters {
        state: RemoteState::Open,
        limit: REMOTE_LIMIT,
        ..Default::default()
    });

    let stages = match intent {
        Intent::FeatureFinding | Intent::PatchRequest => vec![vec![search]],
        Intent::Overview => vec![vec![docs_search, search]],
        Intent::Prioritization => vec![vec![issues, pulls]],
        Intent::Suggestion => vec![vec![search, issues]],
    };

    Plan {
        stages: stages
            .into_iter()
            .map(|stage| filter_scope(stage, scope))
            .filter(|stage| !stage.is_empty())
            .collect(),
    }
}

/// One broadened retry when the first pass came up short: no filters, and
/// for remote-leaning intents a wider state window.
pub fn refined_plan(intent: Intent, query: &str, scope: Scope, top_k: usize) -> Plan {
    let broad_search = ToolCall::SearchRepo {
        query: query.to_string(),
        filters: SearchFilters::default(),
        top_k: top_k * 2,
    };
    let all_issues = ToolCall::GetIssues(RemoteFilters {
        state: RemoteState::All,
        limit: REMOTE_LIMIT,
        ..Default::default()
    });
    let all_pulls = ToolCall::GetPullRequests(RemoteFilters {
        state: RemoteState::All,
        limit: REMOTE_LIMIT,
        ..Default::default()
    });

    let stage = match intent {
        Intent::Prioritization => vec![all_issues, all_pulls],
        Intent::Suggestion => vec![broad_search, all_issues],
        Intent::FeatureFinding | Intent::Overview | Intent::PatchRequest => vec![broad_search],
    };

    Plan {
        stages: vec![filter_scope(stage, scope)]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

/// Dependent follow-ups: open the files behind the best chunk hits so the
/// synthesis sees full definitions, not just matching windows.
pub fn follow_ups(intent: Intent, store: &EvidenceStore, budget_left: usize) -> Vec<ToolCall> {
    if budget_left == 0 {
        return Vec::new();
    }
    if !matches!(
        intent,
        Intent::FeatureFinding | Intent::PatchRequest | Intent::Overview
    ) {
        return Vec::new();
    }

    let mut paths: Vec<String> = Vec::new();
    for item in store.set().iter() {
        if item.kind() != EvidenceKind::Chunk {
            continue;
        }
        let SourceRef::Chunk(chunk) = &item.source else {
            continue;
        };
        let Some(chunk) = store.index().chunk(*chunk) else {
            continue;
        };
        if !paths.contains(&chunk.file_path) {
            paths.push(chunk.file_path.clone());
        }
    }

    paths
        .into_iter()
        .take(FOLLOW_UP_FILES.min(budget_left))
        .map(|path| ToolCall::OpenFile { path, range: None })
        .collect()
}

/// Drop remote calls when the request is scoped to files only.
fn filter_scope(stage: Vec<ToolCall>, scope: Scope) -> Vec<ToolCall> {
    match scope {
        Scope::IncludeRemote => stage,
        Scope::FilesOnly => stage.into_iter().filter(|c| !c.is_remote()).collect(),
    }
}
