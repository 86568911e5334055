//! App-wide constants.
//!
//! Centralises the tool name, config paths, environment variable names,
//! and tuning defaults so a rename only requires changing this file.

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "cited";

/// Crate version, injected by cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Local config filename (e.g. `.cited.toml` in repo root).
pub const CONFIG_FILENAME: &str = ".cited.toml";

/// Directory name under `~/.config/` for global config and sessions.
pub const CONFIG_DIR: &str = "cited";

/// Default chunk window size in lines when no structural boundaries are found.
pub const DEFAULT_CHUNK_LINES: usize = 40;

/// Default number of ranked results returned by `search_repo`.
pub const DEFAULT_TOP_K: usize = 10;

/// Hard cap on tool calls per request.
pub const MAX_TOOL_CALLS: usize = 6;

// ── Environment variable names ──────────────────────────────────────

pub const ENV_PROVIDER: &str = "CITED_PROVIDER";
pub const ENV_MODEL: &str = "CITED_MODEL";
pub const ENV_API_KEY: &str = "CITED_API_KEY";
pub const ENV_BASE_URL: &str = "CITED_BASE_URL";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
