//! Shared types used across all modules.
//!
//! This module defines the core data structures for repositories, chunks,
//! remote issues/PRs, evidence, and the response envelope. Other modules
//! import from here rather than reaching into each other's internals.

pub mod envelope;
pub mod evidence;
pub mod remote;
pub mod repo;

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use envelope::{Citation, RequestStatus, ResponseEnvelope};
pub use evidence::{EvidenceId, EvidenceItem, EvidenceKind, EvidenceSet, Provenance, SourceRef};
pub use remote::{Issue, PullRequest, RemoteFilters, RemoteState};
pub use repo::{Chunk, ChunkId, EpochId, FileRecord, Repository};

/// Query intent, assigned by the classification oracle call.
///
/// The planner templates a tool-call plan from the intent, and the
/// sufficiency predicate in the evaluating state is intent-specific.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Intent {
    /// "Where is X implemented?" Needs code chunk evidence.
    FeatureFinding,
    /// "What does this repo do?" Orientation over docs and summaries.
    Overview,
    /// "What should we work on?" Ranks open issues and PRs.
    Prioritization,
    /// "What next steps do you suggest?" Any evidence class suffices.
    Suggestion,
    /// "Write a fix for X": like feature-finding, plus a patch in the answer.
    PatchRequest,
}

/// How the final answer should be shaped (user preference, not classification).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Thorough explanation with citations.
    #[default]
    Explain,
    /// Locations first, brief explanation second.
    Locate,
    /// Concrete next steps with impact/effort labels.
    Suggest,
    /// Propose a change as a unified diff.
    Patch,
}

/// Which tools a request may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// All tools, including issue and PR lookups.
    #[default]
    IncludeRemote,
    /// Only repository-local tools.
    FilesOnly,
}

/// The fixed tool vocabulary of the gateway.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolName {
    SearchRepo,
    OpenFile,
    GetIssues,
    GetPullRequests,
}

/// Supported LLM provider backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
    Gemini,
    /// Any OpenAI-compatible API (e.g. Ollama, Together, local servers).
    #[serde(rename = "openai-compatible")]
    OpenAICompatible,
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderName::Anthropic => write!(f, "anthropic"),
            ProviderName::OpenAI => write!(f, "openai"),
            ProviderName::Gemini => write!(f, "gemini"),
            ProviderName::OpenAICompatible => write!(f, "openai-compatible"),
        }
    }
}

impl std::str::FromStr for ProviderName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(ProviderName::Anthropic),
            "openai" => Ok(ProviderName::OpenAI),
            "gemini" => Ok(ProviderName::Gemini),
            "openai-compatible" => Ok(ProviderName::OpenAICompatible),
            other => Err(format!(
                "unsupported provider: '{other}'. Supported: anthropic, openai, gemini, \
                 openai-compatible"
            )),
        }
    }
}

impl ProviderName {
    /// Returns the provider-specific environment variable name for the API key.
    ///
    /// These match the env var names used by rig-core's `from_env()` implementations.
    pub fn api_key_env_var(self) -> &'static str {
        match self {
            ProviderName::Anthropic => "ANTHROPIC_API_KEY",
            ProviderName::OpenAI | ProviderName::OpenAICompatible => "OPENAI_API_KEY",
            ProviderName::Gemini => "GEMINI_API_KEY",
        }
    }
}
