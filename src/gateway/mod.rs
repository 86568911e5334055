//! The tool gateway: the only path from orchestration to data.
//!
//! Tool calls are a closed vocabulary ([`ToolCall`]) executed against the
//! index snapshot and the remote fetcher. Execution is read-only and safe
//! to run concurrently; evidence registration happens separately through
//! [`ToolGateway::record`] so results land in the evidence set in plan
//! order regardless of completion order. Remote fetches are cached for the
//! session, keyed by their filters.

use std::collections::HashMap;
use std::sync::Arc;

use colored::Colorize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::evidence::{EvidenceStore, StoreError};
use crate::fetch::{FetchError, RemoteFetcher};
use crate::index::RepoIndex;
use crate::models::{
    ChunkId, EvidenceId, Issue, Provenance, PullRequest, RemoteFilters, ToolName,
};
use crate::retriever::{self, RankedChunk, RetrieveError, SearchFilters};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("cannot open binary file: {0}")]
    BinaryFile(String),

    #[error("line range {start}-{end} out of bounds for {path} ({num_lines} lines)")]
    LineRangeOutOfBounds {
        path: String,
        start: usize,
        end: usize,
        num_lines: usize,
    },

    #[error("remote access is disabled for this request")]
    RemoteDisabled,

    #[error(transparent)]
    Retrieve(#[from] RetrieveError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Evidence(#[from] StoreError),
}

/// One tool invocation. The planner emits these; nothing else reaches data.
#[derive(Debug, Clone)]
pub enum ToolCall {
    SearchRepo {
        query: String,
        filters: SearchFilters,
        top_k: usize,
    },
    OpenFile {
        path: String,
        /// 1-indexed inclusive range; `None` opens the whole file.
        range: Option<(usize, usize)>,
    },
    GetIssues(RemoteFilters),
    GetPullRequests(RemoteFilters),
}

impl ToolCall {
    pub fn name(&self) -> ToolName {
        match self {
            ToolCall::SearchRepo { .. } => ToolName::SearchRepo,
            ToolCall::OpenFile { .. } => ToolName::OpenFile,
            ToolCall::GetIssues(_) => ToolName::GetIssues,
            ToolCall::GetPullRequests(_) => ToolName::GetPullRequests,
        }
    }

    /// Whether the call touches the remote code host.
    pub fn is_remote(&self) -> bool {
        matches!(self, ToolCall::GetIssues(_) | ToolCall::GetPullRequests(_))
    }
}

/// Result of executing one tool call, before evidence registration.
#[derive(Debug)]
pub enum ToolOutput {
    Search(Vec<RankedChunk>),
    File {
        path: String,
        start: usize,
        end: usize,
        /// Chunks overlapping the opened span, in file order.
        chunks: Vec<ChunkId>,
    },
    Issues(Vec<Issue>),
    PullRequests(Vec<PullRequest>),
}

/// Session-scoped cache of remote fetches.
#[derive(Default)]
struct RemoteCache {
    issues: HashMap<String, Vec<Issue>>,
    pull_requests: HashMap<String, Vec<PullRequest>>,
}

pub struct ToolGateway {
    index: Arc<RepoIndex>,
    fetcher: Option<Arc<dyn RemoteFetcher>>,
    cache: Mutex<RemoteCache>,
    verbose: bool,
}

impl ToolGateway {
    pub fn new(index: Arc<RepoIndex>, fetcher: Option<Arc<dyn RemoteFetcher>>, verbose: bool) -> Self {
        Self {
            index,
            fetcher,
            cache: Mutex::new(RemoteCache::default()),
            verbose,
        }
    }

    pub fn index(&self) -> &Arc<RepoIndex> {
        &self.index
    }

    pub fn has_remote(&self) -> bool {
        self.fetcher.is_some()
    }

    /// Execute one tool call. Read-only; never mutates evidence.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolOutput, GatewayError> {
        self.trace(call);
        match call {
            ToolCall::SearchRepo {
                query,
                filters,
                top_k,
            } => {
                let hits = retriever::search(query, filters, &self.index, *top_k, None)?;
                Ok(ToolOutput::Search(hits))
            }
            ToolCall::OpenFile { path, range } => self.open_file(path, *range),
            ToolCall::GetIssues(filters) => {
                let issues = self.issues_cached(filters).await?;
                Ok(ToolOutput::Issues(issues))
            }
            ToolCall::GetPullRequests(filters) => {
                let prs = self.pull_requests_cached(filters).await?;
                Ok(ToolOutput::PullRequests(prs))
            }
        }
    }

    /// Register a tool output's results as evidence, in result order.
    /// Returns the evidence ids minted (or reused) for the output.
    pub fn record(
        &self,
        call: &ToolCall,
        output: &ToolOutput,
        store: &mut EvidenceStore,
    ) -> Result<Vec<EvidenceId>, GatewayError> {
        let tool = call.name();
        let mut ids = Vec::new();
        match output {
            ToolOutput::Search(hits) => {
                for (rank, hit) in hits.iter().enumerate() {
                    ids.push(store.add_chunk(hit.chunk, Provenance { tool, rank }, hit.score)?);
                }
            }
            ToolOutput::File { path, chunks, .. } => {
                // File-level summary first, then the opened text itself
                ids.push(store.add_file_summary(path, Provenance { tool, rank: 0 }, 0.0)?);
                for (rank, &chunk) in chunks.iter().enumerate() {
                    ids.push(store.add_chunk(chunk, Provenance { tool, rank: rank + 1 }, 0.0)?);
                }
            }
            ToolOutput::Issues(items) => {
                for (rank, issue) in items.iter().enumerate() {
                    ids.push(store.add_issue(issue, Provenance { tool, rank }));
                }
            }
            ToolOutput::PullRequests(items) => {
                for (rank, pr) in items.iter().enumerate() {
                    ids.push(store.add_pull_request(pr, Provenance { tool, rank }));
                }
            }
        }
        Ok(ids)
    }

    fn open_file(&self, path: &str, range: Option<(usize, usize)>) -> Result<ToolOutput, GatewayError> {
        let file = self
            .index
            .file(path)
            .ok_or_else(|| GatewayError::FileNotFound(path.to_string()))?;
        if file.is_binary {
            return Err(GatewayError::BinaryFile(path.to_string()));
        }
        let (start, end) = range.unwrap_or((1, file.num_lines.max(1)));
        if start == 0 || start > end || end > file.num_lines {
            return Err(GatewayError::LineRangeOutOfBounds {
                path: path.to_string(),
                start,
                end,
                num_lines: file.num_lines,
            });
        }

        let chunks: Vec<ChunkId> = file
            .chunk_ids
            .iter()
            .copied()
            .filter(|&id| {
                self.index
                    .chunk(id)
                    .is_some_and(|c| c.start_line <= end && c.end_line >= start)
            })
            .collect();

        Ok(ToolOutput::File {
            path: path.to_string(),
            start,
            end,
            chunks,
        })
    }

    async fn issues_cached(&self, filters: &RemoteFilters) -> Result<Vec<Issue>, GatewayError> {
        let fetcher = self.fetcher.as_ref().ok_or(GatewayError::RemoteDisabled)?;
        let key = filters.cache_key();
        {
            let cache = self.cache.lock().await;
            if let Some(hit) = cache.issues.get(&key) {
                return Ok(apply_limit(hit.clone(), filters.limit));
            }
        }
        let fetched = fetcher.issues(filters).await?;
        let mut cache = self.cache.lock().await;
        cache.issues.insert(key, fetched.clone());
        Ok(apply_limit(fetched, filters.limit))
    }

    async fn pull_requests_cached(
        &self,
        filters: &RemoteFilters,
    ) -> Result<Vec<PullRequest>, GatewayError> {
        let fetcher = self.fetcher.as_ref().ok_or(GatewayError::RemoteDisabled)?;
        let key = filters.cache_key();
        {
            let cache = self.cache.lock().await;
            if let Some(hit) = cache.pull_requests.get(&key) {
                return Ok(apply_limit(hit.clone(), filters.limit));
            }
        }
        let fetched = fetcher.pull_requests(filters).await?;
        let mut cache = self.cache.lock().await;
        cache.pull_requests.insert(key, fetched.clone());
        Ok(apply_limit(fetched, filters.limit))
    }

    /// Short repository description fed to the classification call.
    pub fn repo_context(&self) -> String {
        let repo = &self.index.repo;
        let mut top_level: Vec<&str> = self
            .index
            .files()
            .iter()
            .map(|f| f.path.split('/').next().unwrap_or(f.path.as_str()))
            .collect();
        top_level.dedup();
        top_level.truncate(30);
        let mut context = format!(
            "{} files, {} chunks. Top-level entries: {}",
            repo.total_files,
            repo.total_chunks,
            top_level.join(", ")
        );
        if !self.index.dir_tags.is_empty() {
            let mut dirs: Vec<(&String, &String)> = self.index.dir_tags.iter().collect();
            dirs.sort();
            let summaries: Vec<String> = dirs
                .iter()
                .take(10)
                .map(|(dir, tag)| format!("{dir}: {tag}"))
                .collect();
            context.push_str(&format!("\nDirectory summaries: {}", summaries.join(" | ")));
        }
        context
    }

    fn trace(&self, call: &ToolCall) {
        if !self.verbose {
            return;
        }
        let detail = match call {
            ToolCall::SearchRepo { query, top_k, .. } => format!("{query:?} (top {top_k})"),
            ToolCall::OpenFile { path, range } => match range {
                Some((s, e)) => format!("{path}:{s}-{e}"),
                None => path.clone(),
            },
            ToolCall::GetIssues(f) | ToolCall::GetPullRequests(f) => {
                format!("state={} query={:?}", f.state, f.query.as_deref().unwrap_or(""))
            }
        };
        eprintln!("{} {} {}", "tool".dimmed(), call.name().to_string().cyan(), detail);
    }
}

/// `limit == 0` means no limit.
fn apply_limit<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    if limit > 0 {
        items.truncate(limit);
    }
    items
}
