//! Issue and pull request records fetched from the code host.
//!
//! These are referenced by id from evidence items (weak relation); they are
//! cached for the session but never owned by the repository index.

use serde::{Deserialize, Serialize};

/// State filter for issues and pull requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RemoteState {
    #[default]
    Open,
    Closed,
    /// PRs only. Treated as `Closed` for issues.
    Merged,
    All,
}

impl std::fmt::Display for RemoteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteState::Open => write!(f, "open"),
            RemoteState::Closed => write!(f, "closed"),
            RemoteState::Merged => write!(f, "merged"),
            RemoteState::All => write!(f, "all"),
        }
    }
}

/// An issue on the remote code host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub state: RemoteState,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub url: String,
}

/// A pull request on the remote code host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub state: RemoteState,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub url: String,
    /// File paths touched by the PR, when the host provides them.
    #[serde(default)]
    pub touched_paths: Vec<String>,
}

/// Filters for a remote fetch. Also forms the session cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteFilters {
    /// Free-text match against title and body.
    pub query: Option<String>,
    pub state: RemoteState,
    pub labels: Vec<String>,
    pub limit: usize,
}

impl RemoteFilters {
    /// Stable cache key: query + state + labels. The limit is applied after
    /// caching so a narrower limit can reuse a wider cached fetch.
    pub fn cache_key(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.query.as_deref().unwrap_or(""));
        hasher.update([0u8]);
        hasher.update(self.state.to_string());
        for label in &self.labels {
            hasher.update([0u8]);
            hasher.update(label);
        }
        hex::encode(&hasher.finalize()[..16])
    }
}
