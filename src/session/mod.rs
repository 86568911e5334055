//! Named conversation sessions persisted between invocations.
//!
//! A session stores a rolling window of recent queries with short answer
//! summaries, plus the locations of recently cited evidence. The window
//! feeds the synthesis prompt as context; it is advisory only and nothing
//! else depends on it existing.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{RequestStatus, ResponseEnvelope};

/// Recent queries kept per session.
const MAX_QUERIES: usize = 10;
/// Answer summary budget in characters.
const SUMMARY_CHARS: usize = 300;
/// Cited-evidence locations kept per session.
const MAX_EVIDENCE_REFS: usize = 50;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("could not determine a config directory for sessions")]
    NoConfigDir,

    #[error("invalid session name: {0:?} (letters, digits, '-' and '_' only)")]
    InvalidName(String),

    #[error("failed to access session file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse session file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// One past query and how it went.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query: String,
    pub summary: String,
    pub status: RequestStatus,
    /// Unix seconds.
    pub asked_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub queries: Vec<QueryRecord>,
    /// Locations of recently cited evidence ("src/auth.py:1-40", "issue #7").
    #[serde(default)]
    pub evidence_refs: Vec<String>,
}

impl Session {
    fn new(name: &str) -> Self {
        let now = unix_now();
        Self {
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            queries: Vec::new(),
            evidence_refs: Vec::new(),
        }
    }

    /// Fold one completed request into the session window.
    pub fn record(&mut self, query: &str, envelope: &ResponseEnvelope) {
        self.queries.push(QueryRecord {
            query: query.to_string(),
            summary: truncate_chars(&envelope.answer, SUMMARY_CHARS),
            status: envelope.status,
            asked_at: unix_now(),
        });
        if self.queries.len() > MAX_QUERIES {
            let excess = self.queries.len() - MAX_QUERIES;
            self.queries.drain(..excess);
        }

        for citation in &envelope.citations {
            if !self.evidence_refs.contains(&citation.location) {
                self.evidence_refs.push(citation.location.clone());
            }
        }
        if self.evidence_refs.len() > MAX_EVIDENCE_REFS {
            let excess = self.evidence_refs.len() - MAX_EVIDENCE_REFS;
            self.evidence_refs.drain(..excess);
        }
        self.updated_at = unix_now();
    }

    /// Recent history rendered for the synthesis prompt. Empty string for a
    /// fresh session.
    pub fn context(&self) -> String {
        let mut out = String::new();
        for record in &self.queries {
            out.push_str(&format!("Q: {}\nA: {}\n", record.query, record.summary));
        }
        out
    }
}

/// On-disk storage for sessions, one JSON file per name.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Store under the user config directory (`<config>/cited/sessions`).
    pub fn default_location() -> Result<Self, SessionError> {
        let dir = dirs::config_dir()
            .ok_or(SessionError::NoConfigDir)?
            .join(crate::constants::CONFIG_DIR)
            .join("sessions");
        Ok(Self { dir })
    }

    pub fn at(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, SessionError> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Load an existing session or start a fresh one.
    pub fn open(&self, name: &str) -> Result<Session, SessionError> {
        match self.load(name)? {
            Some(session) => Ok(session),
            None => Ok(Session::new(name)),
        }
    }

    pub fn load(&self, name: &str) -> Result<Option<Session>, SessionError> {
        let path = self.path_for(name)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SessionError::Io { path, source: e }),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| SessionError::Parse { path, source: e })
    }

    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        let path = self.path_for(&session.name)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| SessionError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let json = serde_json::to_string_pretty(session).expect("session serializes");
        std::fs::write(&path, json).map_err(|e| SessionError::Io { path, source: e })
    }

    /// Delete a session. Missing sessions are not an error.
    pub fn clear(&self, name: &str) -> Result<(), SessionError> {
        let path = self.path_for(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Io { path, source: e }),
        }
    }

    /// Session names present on disk, sorted.
    pub fn list(&self) -> Result<Vec<String>, SessionError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SessionError::Io {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    path.file_stem().map(|s| s.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect();
        names.sort();
        Ok(names)
    }
}

fn validate_name(name: &str) -> Result<(), SessionError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(SessionError::InvalidName(name.to_string()))
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
