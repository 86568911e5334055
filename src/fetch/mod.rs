//! Remote code-host access behind a trait boundary.
//!
//! The gateway talks to [`RemoteFetcher`] only, so tests inject a mock and
//! the GitHub client stays swappable for other hosts. Fetch failures are
//! typed and surface as tool-call failures, never as panics.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{Issue, PullRequest, RemoteFilters, RemoteState};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("no remote repository configured; set remote.repo (owner/name) or pass --repo-slug")]
    NotConfigured,

    #[error("remote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("could not decode remote response: {0}")]
    Decode(String),
}

/// Read-only access to the code host's issues and pull requests.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn issues(&self, filters: &RemoteFilters) -> Result<Vec<Issue>, FetchError>;
    async fn pull_requests(&self, filters: &RemoteFilters) -> Result<Vec<PullRequest>, FetchError>;
}

/// Items fetched per page. One page per call keeps latency bounded; the
/// session cache amortizes repeats.
const PER_PAGE: usize = 100;

/// GitHub REST v3 client.
pub struct GithubFetcher {
    client: reqwest::Client,
    api_base: String,
    /// `owner/name`.
    repo: String,
    token: Option<String>,
}

impl GithubFetcher {
    pub fn new(api_base: &str, repo: &str, token: Option<String>) -> Result<Self, FetchError> {
        if repo.trim().is_empty() {
            return Err(FetchError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            token,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let mut request = self.client.get(url).query(params);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteFetcher for GithubFetcher {
    async fn issues(&self, filters: &RemoteFilters) -> Result<Vec<Issue>, FetchError> {
        let url = format!("{}/repos/{}/issues", self.api_base, self.repo);
        let mut params = vec![
            ("state", state_param(filters.state).to_string()),
            ("per_page", PER_PAGE.to_string()),
        ];
        if !filters.labels.is_empty() {
            params.push(("labels", filters.labels.join(",")));
        }
        let raw: Vec<GhIssue> = self.get_json(&url, &params).await?;
        Ok(raw
            .into_iter()
            // The issues endpoint also returns PRs; keep true issues only
            .filter(|i| i.pull_request.is_none())
            .map(GhIssue::into_issue)
            .filter(|i| matches_query(filters, &i.title, &i.body))
            .collect())
    }

    async fn pull_requests(&self, filters: &RemoteFilters) -> Result<Vec<PullRequest>, FetchError> {
        let url = format!("{}/repos/{}/pulls", self.api_base, self.repo);
        let params = vec![
            ("state", state_param(filters.state).to_string()),
            ("per_page", PER_PAGE.to_string()),
        ];
        let raw: Vec<GhPull> = self.get_json(&url, &params).await?;
        Ok(raw
            .into_iter()
            .map(GhPull::into_pull_request)
            .filter(|pr| {
                (filters.state != RemoteState::Merged || pr.state == RemoteState::Merged)
                    && label_match(&filters.labels, &pr.labels)
                    && matches_query(filters, &pr.title, &pr.body)
            })
            .collect())
    }
}

/// GitHub's list endpoints only understand open/closed/all; merged PRs are
/// filtered client-side from `merged_at`.
fn state_param(state: RemoteState) -> &'static str {
    match state {
        RemoteState::Open => "open",
        RemoteState::Closed | RemoteState::Merged => "closed",
        RemoteState::All => "all",
    }
}

/// Case-insensitive free-text match against title and body.
fn matches_query(filters: &RemoteFilters, title: &str, body: &str) -> bool {
    match &filters.query {
        None => true,
        Some(q) if q.trim().is_empty() => true,
        Some(q) => {
            let q = q.to_lowercase();
            title.to_lowercase().contains(&q) || body.to_lowercase().contains(&q)
        }
    }
}

fn label_match(wanted: &[String], have: &[String]) -> bool {
    wanted.iter().all(|w| have.iter().any(|h| h.eq_ignore_ascii_case(w)))
}

#[derive(Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Deserialize)]
struct GhIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<GhLabel>,
    state: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    updated_at: String,
    #[serde(default)]
    html_url: String,
    /// Present when the "issue" is actually a pull request.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl GhIssue {
    fn into_issue(self) -> Issue {
        Issue {
            number: self.number,
            title: self.title,
            body: self.body.unwrap_or_default(),
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            state: parse_state(&self.state),
            created_at: self.created_at,
            updated_at: self.updated_at,
            url: self.html_url,
        }
    }
}

#[derive(Deserialize)]
struct GhPull {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<GhLabel>,
    state: String,
    #[serde(default)]
    merged_at: Option<String>,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    updated_at: String,
    #[serde(default)]
    html_url: String,
}

impl GhPull {
    fn into_pull_request(self) -> PullRequest {
        let state = if self.merged_at.is_some() {
            RemoteState::Merged
        } else {
            parse_state(&self.state)
        };
        PullRequest {
            number: self.number,
            title: self.title,
            body: self.body.unwrap_or_default(),
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            state,
            created_at: self.created_at,
            updated_at: self.updated_at,
            url: self.html_url,
            touched_paths: Vec::new(),
        }
    }
}

fn parse_state(raw: &str) -> RemoteState {
    match raw {
        "closed" => RemoteState::Closed,
        _ => RemoteState::Open,
    }
}
