//! ReasoningEngine trait and LLM integration.
//!
//! Provides an abstraction layer over rig-core to decouple the
//! orchestrator from the specific LLM library. Every call through this
//! boundary is timeout-bounded and retryable; orchestration state never
//! depends on the engine's internals.

pub mod rig;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{EvidenceId, Intent, Mode};

/// Errors from the reasoning engine.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("oracle call timed out")]
    Timeout,

    #[error("oracle returned an unparseable result: {0}")]
    Unparseable(String),

    #[error("LLM API error: {0}")]
    Api(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// Initial backoff delay between retries.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(5);

/// Maximum backoff delay between retries.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Whether an error is worth retrying (timeouts, rate limits, 5xx).
pub fn is_retryable(error: &OracleError) -> bool {
    match error {
        OracleError::Timeout => true,
        OracleError::Api(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("429")
                || msg.contains("rate limit")
                || msg.contains("overloaded")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
        }
        OracleError::Unparseable(_) | OracleError::NotConfigured(_) => false,
    }
}

/// Exponential backoff for the given retry attempt (0-based).
pub fn retry_backoff(attempt: u32) -> Duration {
    let backoff = INITIAL_BACKOFF * 2u32.saturating_pow(attempt);
    backoff.min(MAX_BACKOFF)
}

/// One evidence item rendered for synthesis.
#[derive(Debug, Clone)]
pub struct EvidenceBlock {
    pub id: EvidenceId,
    /// `path:start-end`, `issue #N`, etc.
    pub location: String,
    pub text: String,
}

/// Input to the synthesis call.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub query: String,
    pub mode: Mode,
    pub evidence: Vec<EvidenceBlock>,
    /// Recent conversation context from the session, possibly empty.
    pub session_context: String,
}

/// A file to tag: path plus a representative snippet.
#[derive(Debug, Clone)]
pub struct FileTagRequest {
    pub path: String,
    pub snippet: String,
}

/// Trait for the external reasoning engine.
///
/// Implementations handle prompt construction and response parsing for
/// the two oracle call shapes plus best-effort tag generation.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Map a query to an intent category.
    async fn classify(&self, query: &str, context: &str) -> Result<Intent, OracleError>;

    /// Produce the answer text. Every repository fact must carry an
    /// `[E:<id>]` marker drawn from the supplied evidence; the
    /// orchestrator post-validates.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<String, OracleError>;

    /// Generate one short descriptive tag per file, best effort.
    ///
    /// The returned vector is positionally aligned with the batch; `None`
    /// entries mean the engine declined to tag that file.
    async fn tag_files(
        &self,
        batch: &[FileTagRequest],
    ) -> Result<Vec<Option<String>>, OracleError>;
}

/// Parse an intent label out of a raw classification response.
///
/// Tolerates surrounding prose: takes the first known label found in the
/// lowercased response.
pub fn parse_intent(response: &str) -> Result<Intent, OracleError> {
    let lowered = response.to_lowercase();
    if let Ok(intent) = lowered.trim().trim_matches(['"', '`', '.']).parse::<Intent>() {
        return Ok(intent);
    }
    const LABELS: &[(&str, Intent)] = &[
        ("feature_finding", Intent::FeatureFinding),
        ("overview", Intent::Overview),
        ("prioritization", Intent::Prioritization),
        ("suggestion", Intent::Suggestion),
        ("patch_request", Intent::PatchRequest),
    ];
    let mut found: Option<(usize, Intent)> = None;
    for &(label, intent) in LABELS {
        if let Some(pos) = lowered.find(label) {
            if found.is_none_or(|(best, _)| pos < best) {
                found = Some((pos, intent));
            }
        }
    }
    found
        .map(|(_, intent)| intent)
        .ok_or_else(|| OracleError::Unparseable(truncate(response, 200)))
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
