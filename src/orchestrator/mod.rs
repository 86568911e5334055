//! The planner-executor loop.
//!
//! One request moves through a fixed state sequence: classify, plan,
//! execute tool calls, evaluate sufficiency, synthesize, post-validate.
//! Three terminals exist: `Done` (answered, with citations), `Insufficient`
//! (evidence never cleared the bar), and `Failed` (oracle or infrastructure
//! gave out). Tool calls are budgeted per request; independent plan steps
//! run on a bounded worker pool; a single refinement pass broadens the
//! search before giving up.

pub mod answer;
pub mod planner;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{OrchestratorConfig, RetrievalConfig};
use crate::evidence::EvidenceStore;
use crate::gateway::{ToolCall, ToolGateway};
use crate::models::{
    Citation, EvidenceKind, Intent, Mode, RequestStatus, ResponseEnvelope, Scope,
};
use crate::oracle::{
    is_retryable, retry_backoff, OracleError, ReasoningEngine, SynthesisRequest,
};

/// Request lifecycle states, in order. Terminals never transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Classifying,
    Planning,
    Executing,
    Evaluating,
    Synthesizing,
    Done,
    Insufficient,
    Failed,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            State::Idle => "idle",
            State::Classifying => "classifying",
            State::Planning => "planning",
            State::Executing => "executing",
            State::Evaluating => "evaluating",
            State::Synthesizing => "synthesizing",
            State::Done => "done",
            State::Insufficient => "insufficient",
            State::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// One question, with its answer-shaping knobs.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub query: String,
    pub mode: Mode,
    pub scope: Scope,
    /// Recent session history rendered as text; empty for fresh sessions.
    pub session_context: String,
}

pub struct Orchestrator {
    gateway: Arc<ToolGateway>,
    oracle: Arc<dyn ReasoningEngine>,
    config: OrchestratorConfig,
    retrieval: RetrievalConfig,
    cancel: Arc<AtomicBool>,
    verbose: bool,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<ToolGateway>,
        oracle: Arc<dyn ReasoningEngine>,
        config: OrchestratorConfig,
        retrieval: RetrievalConfig,
        verbose: bool,
    ) -> Self {
        Self {
            gateway,
            oracle,
            config,
            retrieval,
            cancel: Arc::new(AtomicBool::new(false)),
            verbose,
        }
    }

    /// Handle for aborting an in-flight request (e.g. from a ctrl-c handler).
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Run one request to a terminal state. Always returns an envelope;
    /// failures are reported in it, not panicked or bubbled.
    pub async fn run(&self, request: AskRequest) -> ResponseEnvelope {
        let mut store = EvidenceStore::new(self.gateway.index().clone());

        // Classifying
        self.enter(State::Classifying);
        if self.cancelled() {
            return self.failed(&store, "request cancelled");
        }
        let context = self.gateway.repo_context();
        let intent = {
            let oracle = self.oracle.clone();
            let query = request.query.clone();
            match self
                .with_retry(|| {
                    let oracle = oracle.clone();
                    let query = query.clone();
                    let context = context.clone();
                    async move { oracle.classify(&query, &context).await }
                })
                .await
            {
                Ok(intent) => intent,
                Err(e) => return self.failed(&store, &format!("could not classify query: {e}")),
            }
        };
        if self.verbose {
            eprintln!("{} {intent}", "intent".dimmed());
        }

        // Planning
        self.enter(State::Planning);
        let scope = if self.gateway.has_remote() {
            request.scope
        } else {
            Scope::FilesOnly
        };
        let plan = planner::initial_plan(intent, &request.query, scope, self.retrieval.top_k);

        // Executing
        self.enter(State::Executing);
        let mut budget = self.config.max_tool_calls;
        let mut failures: Vec<String> = Vec::new();
        if self
            .execute_plan(&plan, &mut store, &mut budget, &mut failures)
            .await
            .is_err()
        {
            return self.failed(&store, "request cancelled");
        }
        self.execute_follow_ups(intent, &mut store, &mut budget, &mut failures)
            .await;
        if self.verbose {
            for failure in &failures {
                eprintln!("{} {failure}", "tool-error".dimmed());
            }
        }

        // Evaluating, with one broadened retry
        self.enter(State::Evaluating);
        let mut floor = self.retrieval.relevance_floor;
        if !sufficient(intent, &store, floor) && budget > 0 {
            let refined =
                planner::refined_plan(intent, &request.query, scope, self.retrieval.top_k);
            if self
                .execute_plan(&refined, &mut store, &mut budget, &mut failures)
                .await
                .is_err()
            {
                return self.failed(&store, "request cancelled");
            }
            floor /= 2.0;
        }
        if !sufficient(intent, &store, floor) {
            self.enter(State::Insufficient);
            return ResponseEnvelope::insufficient(store.citations());
        }

        // Synthesizing
        self.enter(State::Synthesizing);
        if self.cancelled() {
            return self.failed(&store, "request cancelled");
        }
        let synthesis = SynthesisRequest {
            query: request.query.clone(),
            mode: request.mode,
            evidence: store.blocks(),
            session_context: request.session_context.clone(),
        };
        let raw = {
            let oracle = self.oracle.clone();
            let synthesis = Arc::new(synthesis);
            match self
                .with_retry(|| {
                    let oracle = oracle.clone();
                    let synthesis = synthesis.clone();
                    async move { oracle.synthesize(&synthesis).await }
                })
                .await
            {
                Ok(text) => text,
                Err(e) => return self.failed(&store, &format!("synthesis failed: {e}")),
            }
        };

        // Post-validation: strip fabricated markers, require one real citation
        let validated = answer::validate_citations(&raw, &store);
        if validated.repaired && self.verbose {
            eprintln!("{} removed citations of unknown evidence", "repair".dimmed());
        }
        if validated.cited.is_empty() {
            self.enter(State::Insufficient);
            return ResponseEnvelope::insufficient(store.citations());
        }

        let citations: Vec<Citation> = store
            .set()
            .iter()
            .filter(|item| validated.cited.contains(&item.id))
            .map(|item| store.citation(item))
            .collect();
        let patch = answer::extract_patch(&validated.text);
        let next_actions = answer::extract_next_actions(&validated.text);

        self.enter(State::Done);
        ResponseEnvelope {
            answer: validated.text,
            citations,
            patch,
            next_actions,
            status: RequestStatus::Answered,
        }
    }

    /// Execute a plan stage by stage. Calls within a stage run concurrently
    /// under the worker-pool cap; results are recorded in plan order so
    /// evidence ids stay deterministic. Tool failures are noted and skipped.
    /// `Err` means the request was cancelled.
    async fn execute_plan(
        &self,
        plan: &planner::Plan,
        store: &mut EvidenceStore,
        budget: &mut usize,
        failures: &mut Vec<String>,
    ) -> Result<(), ()> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));

        for stage in &plan.stages {
            if self.cancelled() {
                return Err(());
            }
            if *budget == 0 {
                break;
            }
            let calls: Vec<ToolCall> = stage.iter().take(*budget).cloned().collect();
            *budget -= calls.len();

            let mut set = JoinSet::new();
            for (i, call) in calls.iter().cloned().enumerate() {
                let gateway = self.gateway.clone();
                let semaphore = semaphore.clone();
                set.spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    (i, gateway.execute(&call).await)
                });
            }

            let mut outputs: Vec<Option<_>> = (0..calls.len()).map(|_| None).collect();
            while let Some(joined) = set.join_next().await {
                if let Ok((i, result)) = joined {
                    outputs[i] = Some(result);
                }
            }

            for (call, output) in calls.iter().zip(outputs) {
                match output {
                    Some(Ok(output)) => {
                        if let Err(e) = self.gateway.record(call, &output, store) {
                            failures.push(format!("{}: {e}", call.name()));
                        }
                    }
                    Some(Err(e)) => failures.push(format!("{}: {e}", call.name())),
                    None => failures.push(format!("{}: task panicked", call.name())),
                }
            }
        }
        Ok(())
    }

    /// Dependent second wave: open the files behind the best hits.
    async fn execute_follow_ups(
        &self,
        intent: Intent,
        store: &mut EvidenceStore,
        budget: &mut usize,
        failures: &mut Vec<String>,
    ) {
        for call in planner::follow_ups(intent, store, *budget) {
            if self.cancelled() || *budget == 0 {
                return;
            }
            *budget -= 1;
            match self.gateway.execute(&call).await {
                Ok(output) => {
                    if let Err(e) = self.gateway.record(&call, &output, store) {
                        failures.push(format!("{}: {e}", call.name()));
                    }
                }
                Err(e) => failures.push(format!("{}: {e}", call.name())),
            }
        }
    }

    /// Timeout-bounded oracle call with retry on transient errors.
    async fn with_retry<T, F, Fut>(&self, mut call: F) -> Result<T, OracleError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, OracleError>>,
    {
        let timeout = Duration::from_secs(self.config.oracle_timeout_secs);
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(timeout, call()).await {
                Ok(inner) => inner,
                Err(_) => Err(OracleError::Timeout),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.config.oracle_retries && is_retryable(&e) => {
                    if self.verbose {
                        eprintln!("{} {e}, retrying", "oracle".dimmed());
                    }
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn failed(&self, store: &EvidenceStore, message: &str) -> ResponseEnvelope {
        self.enter(State::Failed);
        ResponseEnvelope {
            answer: format!("The request could not be completed: {message}."),
            citations: store.citations(),
            patch: None,
            next_actions: Vec::new(),
            status: RequestStatus::Failed,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn enter(&self, state: State) {
        if self.verbose {
            eprintln!("{} {state}", "state".dimmed());
        }
    }
}

/// Intent-specific sufficiency predicate over the gathered evidence.
fn sufficient(intent: Intent, store: &EvidenceStore, floor: f64) -> bool {
    let set = store.set();
    match intent {
        Intent::FeatureFinding | Intent::PatchRequest => set
            .best_score(EvidenceKind::Chunk)
            .is_some_and(|s| s >= floor),
        Intent::Overview => {
            set.count_of(EvidenceKind::Chunk) > 0 || set.count_of(EvidenceKind::FileSummary) > 0
        }
        Intent::Prioritization => {
            set.count_of(EvidenceKind::Issue) + set.count_of(EvidenceKind::PullRequest) > 0
        }
        Intent::Suggestion => !set.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::models::{Provenance, RemoteState, ToolName};

    fn store_with_chunk(score: f64) -> EvidenceStore {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def a():\n    pass\n").unwrap();
        let (index, _) = crate::index::ingest(dir.path(), &IndexConfig::default()).unwrap();
        let mut store = EvidenceStore::new(Arc::new(index));
        let chunk = store.index().file("a.py").unwrap().chunk_ids[0];
        store
            .add_chunk(
                chunk,
                Provenance {
                    tool: ToolName::SearchRepo,
                    rank: 0,
                },
                score,
            )
            .unwrap();
        store
    }

    #[test]
    fn feature_finding_needs_scored_chunk() {
        let strong = store_with_chunk(0.9);
        assert!(sufficient(Intent::FeatureFinding, &strong, 0.5));
        assert!(sufficient(Intent::PatchRequest, &strong, 0.5));

        let weak = store_with_chunk(0.2);
        assert!(!sufficient(Intent::FeatureFinding, &weak, 0.5));
        // The refinement pass halves the floor; 0.2 < 0.25 still fails
        assert!(!sufficient(Intent::FeatureFinding, &weak, 0.25));
        assert!(sufficient(Intent::FeatureFinding, &weak, 0.1));
    }

    #[test]
    fn prioritization_needs_remote_evidence() {
        let chunks_only = store_with_chunk(0.9);
        assert!(!sufficient(Intent::Prioritization, &chunks_only, 0.5));

        let mut with_issue = store_with_chunk(0.9);
        with_issue.add_issue(
            &crate::models::Issue {
                number: 1,
                title: "t".into(),
                body: String::new(),
                labels: vec![],
                state: RemoteState::Open,
                created_at: String::new(),
                updated_at: String::new(),
                url: String::new(),
            },
            Provenance {
                tool: ToolName::GetIssues,
                rank: 0,
            },
        );
        assert!(sufficient(Intent::Prioritization, &with_issue, 0.5));
    }

    #[test]
    fn suggestion_accepts_any_evidence() {
        let store = store_with_chunk(0.01);
        assert!(sufficient(Intent::Suggestion, &store, 0.5));

        let dir = tempfile::tempdir().unwrap();
        let (index, _) = crate::index::ingest(dir.path(), &IndexConfig::default()).unwrap();
        let empty = EvidenceStore::new(Arc::new(index));
        assert!(!sufficient(Intent::Suggestion, &empty, 0.5));
    }

    #[test]
    fn overview_accepts_chunk_or_summary() {
        let store = store_with_chunk(0.0);
        assert!(sufficient(Intent::Overview, &store, 0.5));
    }

    #[test]
    fn state_display_names() {
        assert_eq!(State::Classifying.to_string(), "classifying");
        assert_eq!(State::Done.to_string(), "done");
        assert_eq!(State::Insufficient.to_string(), "insufficient");
    }
}
