//! Full request lifecycle against a mock reasoning engine and mock fetcher.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use cited::config::{IndexConfig, OrchestratorConfig, RetrievalConfig};
use cited::fetch::{FetchError, RemoteFetcher};
use cited::gateway::ToolGateway;
use cited::index::ingest;
use cited::models::{
    Intent, Issue, Mode, PullRequest, RemoteFilters, RemoteState, RequestStatus, Scope,
};
use cited::oracle::{FileTagRequest, OracleError, ReasoningEngine, SynthesisRequest};
use cited::orchestrator::{AskRequest, Orchestrator};

#[derive(Clone, Copy)]
enum Synth {
    /// Cite the first evidence item and emit a next-actions section.
    CiteFirst,
    /// Cite the first real item plus a fabricated id.
    CiteFirstPlusFake,
    /// Cite only ids that do not exist.
    CiteOnlyFake,
    /// Non-retryable API failure.
    Fail,
}

struct MockOracle {
    intent: Intent,
    synth: Synth,
    classify_failures: AtomicU32,
    classify_calls: AtomicU32,
    synth_calls: AtomicU32,
}

impl MockOracle {
    fn new(intent: Intent, synth: Synth) -> Self {
        Self {
            intent,
            synth,
            classify_failures: AtomicU32::new(0),
            classify_calls: AtomicU32::new(0),
            synth_calls: AtomicU32::new(0),
        }
    }

    fn failing_classify_once(self) -> Self {
        self.classify_failures.store(1, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl ReasoningEngine for MockOracle {
    async fn classify(&self, _query: &str, _context: &str) -> Result<Intent, OracleError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        if self.classify_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            n.checked_sub(1)
        })
        .is_ok()
        {
            return Err(OracleError::Api("HTTP 503 service unavailable".into()));
        }
        Ok(self.intent)
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<String, OracleError> {
        self.synth_calls.fetch_add(1, Ordering::SeqCst);
        let first = request
            .evidence
            .first()
            .expect("synthesis always receives evidence");
        match self.synth {
            Synth::CiteFirst => Ok(format!(
                "The relevant code is at {loc} [E:{id}].\n\n\
                 ## Next Actions\n- Review {loc}\n",
                loc = first.location,
                id = first.id
            )),
            Synth::CiteFirstPlusFake => Ok(format!(
                "Real fact [E:{}]. Fabricated fact [E:e999].",
                first.id
            )),
            Synth::CiteOnlyFake => Ok("Everything is made up [E:e777] [E:e888].".into()),
            Synth::Fail => Err(OracleError::Api("HTTP 401 unauthorized".into())),
        }
    }

    async fn tag_files(
        &self,
        _batch: &[FileTagRequest],
    ) -> Result<Vec<Option<String>>, OracleError> {
        Err(OracleError::NotConfigured("tags disabled in tests".into()))
    }
}

struct MockFetcher {
    issues_fail: bool,
    issue_calls: AtomicU32,
    pr_calls: AtomicU32,
}

impl MockFetcher {
    fn new(issues_fail: bool) -> Self {
        Self {
            issues_fail,
            issue_calls: AtomicU32::new(0),
            pr_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl RemoteFetcher for MockFetcher {
    async fn issues(&self, _: &RemoteFilters) -> Result<Vec<Issue>, FetchError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        if self.issues_fail {
            return Err(FetchError::Status {
                status: 500,
                url: "https://api.example/issues".into(),
            });
        }
        Ok(vec![Issue {
            number: 11,
            title: "Login times out".into(),
            body: "Session creation hangs under load".into(),
            labels: vec!["bug".into()],
            state: RemoteState::Open,
            created_at: String::new(),
            updated_at: String::new(),
            url: String::new(),
        }])
    }

    async fn pull_requests(&self, _: &RemoteFilters) -> Result<Vec<PullRequest>, FetchError> {
        self.pr_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![PullRequest {
            number: 12,
            title: "Cache sessions".into(),
            body: "Avoids repeated hashing".into(),
            labels: vec![],
            state: RemoteState::Open,
            created_at: String::new(),
            updated_at: String::new(),
            url: String::new(),
            touched_paths: vec!["src/auth/session.py".into()],
        }])
    }
}

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn sample_repo(dir: &Path) {
    write(dir, "README.md", "# Shopfront\nStorefront demo.\n");
    write(
        dir,
        "src/auth/login.py",
        "def authenticate(user, password):\n    return verify(user, password)\n",
    );
    write(
        dir,
        "src/billing/invoice.py",
        "def render_invoice(order):\n    return template(order)\n",
    );
}

struct Harness {
    orchestrator: Orchestrator,
    oracle: Arc<MockOracle>,
    fetcher: Option<Arc<MockFetcher>>,
    _dir: tempfile::TempDir,
}

fn harness(
    oracle: MockOracle,
    fetcher: Option<MockFetcher>,
    config: OrchestratorConfig,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());
    let (index, _) = ingest(dir.path(), &IndexConfig::default()).unwrap();

    let oracle = Arc::new(oracle);
    let fetcher = fetcher.map(Arc::new);
    let gateway = Arc::new(ToolGateway::new(
        Arc::new(index),
        fetcher
            .clone()
            .map(|f| f as Arc<dyn RemoteFetcher>),
        false,
    ));
    let orchestrator = Orchestrator::new(
        gateway,
        oracle.clone(),
        config,
        RetrievalConfig::default(),
        false,
    );
    Harness {
        orchestrator,
        oracle,
        fetcher,
        _dir: dir,
    }
}

fn ask(query: &str) -> AskRequest {
    AskRequest {
        query: query.to_string(),
        mode: Mode::Explain,
        scope: Scope::IncludeRemote,
        session_context: String::new(),
    }
}

#[tokio::test]
async fn feature_query_is_answered_with_citations() {
    let h = harness(
        MockOracle::new(Intent::FeatureFinding, Synth::CiteFirst),
        None,
        OrchestratorConfig::default(),
    );
    let envelope = h
        .orchestrator
        .run(ask("where is login authenticate implemented"))
        .await;

    assert_eq!(envelope.status, RequestStatus::Answered);
    assert!(!envelope.citations.is_empty());
    assert!(envelope.answer.contains("[E:e1]"));
    assert!(envelope.citations.iter().any(|c| c.location.starts_with("src/auth/login.py")));
    assert_eq!(envelope.next_actions.len(), 1);
}

#[tokio::test]
async fn unanswerable_query_is_insufficient_without_synthesis() {
    let h = harness(
        MockOracle::new(Intent::FeatureFinding, Synth::CiteFirst),
        None,
        OrchestratorConfig::default(),
    );
    let envelope = h
        .orchestrator
        .run(ask("kubernetes sidecar reconciliation"))
        .await;

    assert_eq!(envelope.status, RequestStatus::Insufficient);
    assert!(envelope.answer.contains("not gather enough evidence"));
    assert_eq!(h.oracle.synth_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn issue_fetch_failure_does_not_sink_the_plan() {
    let h = harness(
        MockOracle::new(Intent::Prioritization, Synth::CiteFirst),
        Some(MockFetcher::new(true)),
        OrchestratorConfig::default(),
    );
    let envelope = h.orchestrator.run(ask("what should we work on next")).await;

    // Issues failed, but the PR fetch succeeded; that evidence suffices
    assert_eq!(envelope.status, RequestStatus::Answered);
    assert!(envelope
        .citations
        .iter()
        .any(|c| c.location == "PR #12"));
}

#[tokio::test]
async fn prioritization_cites_remote_evidence() {
    let h = harness(
        MockOracle::new(Intent::Prioritization, Synth::CiteFirst),
        Some(MockFetcher::new(false)),
        OrchestratorConfig::default(),
    );
    let envelope = h.orchestrator.run(ask("triage the backlog")).await;

    assert_eq!(envelope.status, RequestStatus::Answered);
    assert!(envelope.citations.iter().any(|c| c.location == "issue #11"));
    let fetcher = h.fetcher.as_ref().unwrap();
    assert_eq!(fetcher.issue_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fetcher.pr_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fabricated_markers_are_stripped_but_answer_stands() {
    let h = harness(
        MockOracle::new(Intent::FeatureFinding, Synth::CiteFirstPlusFake),
        None,
        OrchestratorConfig::default(),
    );
    let envelope = h
        .orchestrator
        .run(ask("where is login authenticate implemented"))
        .await;

    assert_eq!(envelope.status, RequestStatus::Answered);
    assert!(!envelope.answer.contains("e999"));
    assert!(envelope.answer.contains("[E:e1]"));
    assert!(envelope.citations.iter().all(|c| c.id.0 != "e999"));
}

#[tokio::test]
async fn answer_with_only_fabricated_citations_is_insufficient() {
    let h = harness(
        MockOracle::new(Intent::FeatureFinding, Synth::CiteOnlyFake),
        None,
        OrchestratorConfig::default(),
    );
    let envelope = h
        .orchestrator
        .run(ask("where is login authenticate implemented"))
        .await;

    assert_eq!(envelope.status, RequestStatus::Insufficient);
    assert_eq!(h.oracle.synth_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn zero_tool_budget_never_answers() {
    let config = OrchestratorConfig {
        max_tool_calls: 0,
        ..Default::default()
    };
    let h = harness(
        MockOracle::new(Intent::FeatureFinding, Synth::CiteFirst),
        None,
        config,
    );
    let envelope = h
        .orchestrator
        .run(ask("where is login authenticate implemented"))
        .await;

    assert_eq!(envelope.status, RequestStatus::Insufficient);
    assert_eq!(h.oracle.synth_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_classify_failure_is_retried_once() {
    let h = harness(
        MockOracle::new(Intent::FeatureFinding, Synth::CiteFirst).failing_classify_once(),
        None,
        OrchestratorConfig::default(),
    );
    let envelope = h
        .orchestrator
        .run(ask("where is login authenticate implemented"))
        .await;

    assert_eq!(h.oracle.classify_calls.load(Ordering::SeqCst), 2);
    assert_eq!(envelope.status, RequestStatus::Answered);
}

#[tokio::test]
async fn synthesis_failure_is_a_failed_envelope() {
    let h = harness(
        MockOracle::new(Intent::FeatureFinding, Synth::Fail),
        None,
        OrchestratorConfig::default(),
    );
    let envelope = h
        .orchestrator
        .run(ask("where is login authenticate implemented"))
        .await;

    assert_eq!(envelope.status, RequestStatus::Failed);
    assert!(envelope.answer.contains("synthesis failed"));
    // Partial evidence still listed for transparency
    assert!(!envelope.citations.is_empty());
}

#[tokio::test]
async fn files_only_scope_never_touches_the_fetcher() {
    let h = harness(
        MockOracle::new(Intent::Prioritization, Synth::CiteFirst),
        Some(MockFetcher::new(false)),
        OrchestratorConfig::default(),
    );
    let envelope = h
        .orchestrator
        .run(AskRequest {
            query: "triage the backlog".into(),
            mode: Mode::Explain,
            scope: Scope::FilesOnly,
            session_context: String::new(),
        })
        .await;

    // Prioritization needs remote evidence, which the scope forbids
    assert_eq!(envelope.status, RequestStatus::Insufficient);
    let fetcher = h.fetcher.as_ref().unwrap();
    assert_eq!(fetcher.issue_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fetcher.pr_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelled_request_fails_without_evidence() {
    // Flips the cancel flag during classification, so the orchestrator
    // sees it before any tool results are merged.
    struct CancellingOracle {
        flag: OnceLock<Arc<AtomicBool>>,
        synth_calls: AtomicU32,
    }

    #[async_trait]
    impl ReasoningEngine for CancellingOracle {
        async fn classify(&self, _: &str, _: &str) -> Result<Intent, OracleError> {
            if let Some(flag) = self.flag.get() {
                flag.store(true, Ordering::SeqCst);
            }
            Ok(Intent::FeatureFinding)
        }

        async fn synthesize(&self, _: &SynthesisRequest) -> Result<String, OracleError> {
            self.synth_calls.fetch_add(1, Ordering::SeqCst);
            Ok("never reached [E:e1]".into())
        }

        async fn tag_files(
            &self,
            _: &[FileTagRequest],
        ) -> Result<Vec<Option<String>>, OracleError> {
            Err(OracleError::NotConfigured("unused".into()))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());
    let (index, _) = ingest(dir.path(), &IndexConfig::default()).unwrap();
    let gateway = Arc::new(ToolGateway::new(Arc::new(index), None, false));
    let oracle = Arc::new(CancellingOracle {
        flag: OnceLock::new(),
        synth_calls: AtomicU32::new(0),
    });
    let orchestrator = Orchestrator::new(
        gateway,
        oracle.clone(),
        OrchestratorConfig::default(),
        RetrievalConfig::default(),
        false,
    );
    oracle.flag.set(orchestrator.cancel_flag()).unwrap();

    let envelope = orchestrator
        .run(ask("where is login authenticate implemented"))
        .await;

    assert_eq!(envelope.status, RequestStatus::Failed);
    assert!(envelope.answer.contains("cancelled"));
    // In-flight work is discarded, nothing was merged or synthesized
    assert!(envelope.citations.is_empty());
    assert_eq!(oracle.synth_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn patch_mode_extracts_the_diff() {
    struct PatchOracle;

    #[async_trait]
    impl ReasoningEngine for PatchOracle {
        async fn classify(&self, _: &str, _: &str) -> Result<Intent, OracleError> {
            Ok(Intent::PatchRequest)
        }

        async fn synthesize(&self, request: &SynthesisRequest) -> Result<String, OracleError> {
            let id = &request.evidence.first().unwrap().id;
            Ok(format!(
                "Change the check [E:{id}].\n\n```diff\n--- a/src/auth/login.py\n\
                 +++ b/src/auth/login.py\n@@ -1 +1 @@\n-def authenticate(user, password):\n\
                 +def authenticate(user, password, *, mfa=None):\n```\n"
            ))
        }

        async fn tag_files(
            &self,
            _: &[FileTagRequest],
        ) -> Result<Vec<Option<String>>, OracleError> {
            Err(OracleError::NotConfigured("unused".into()))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());
    let (index, _) = ingest(dir.path(), &IndexConfig::default()).unwrap();
    let gateway = Arc::new(ToolGateway::new(Arc::new(index), None, false));
    let orchestrator = Orchestrator::new(
        gateway,
        Arc::new(PatchOracle),
        OrchestratorConfig::default(),
        RetrievalConfig::default(),
        false,
    );

    let envelope = orchestrator
        .run(AskRequest {
            query: "add an mfa parameter to authenticate".into(),
            mode: Mode::Patch,
            scope: Scope::FilesOnly,
            session_context: String::new(),
        })
        .await;

    assert_eq!(envelope.status, RequestStatus::Answered);
    let patch = envelope.patch.expect("patch extracted");
    assert!(patch.starts_with("--- a/src/auth/login.py"));
    assert!(patch.contains("+def authenticate(user, password, *, mfa=None):"));
}
