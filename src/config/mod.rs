//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. `.cited.toml` in repo root
//! 4. `~/.config/cited/config.toml` (global defaults)
//! 5. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::env::Env;
use crate::models::ProviderName;

/// Errors during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub orchestrator: OrchestratorConfig,
    pub provider: ProviderConfig,
    pub remote: RemoteConfig,
}

/// Ingestion and chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Fallback window size in lines when no structural boundaries are found.
    pub chunk_lines: usize,
    /// Files at or below this many lines become a single chunk.
    pub chunk_min_lines: usize,
    /// Generate file/directory summary tags via the reasoning engine.
    pub tags: bool,
    /// Extra directory names to exclude, on top of the built-in set.
    pub exclude_dirs: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_lines: crate::constants::DEFAULT_CHUNK_LINES,
            chunk_min_lines: 10,
            tags: false,
            exclude_dirs: Vec::new(),
        }
    }
}

/// Retrieval and ranking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum ranked results returned per search.
    pub top_k: usize,
    /// Minimum score a chunk must reach to satisfy the sufficiency predicate
    /// for code-seeking intents.
    pub relevance_floor: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: crate::constants::DEFAULT_TOP_K,
            relevance_floor: 0.5,
        }
    }
}

/// Planner-executor budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Hard cap on tool calls per request.
    pub max_tool_calls: usize,
    /// Bounded worker pool for independent plan steps.
    pub max_concurrent: usize,
    /// Oracle call timeout in seconds.
    pub oracle_timeout_secs: u64,
    /// Retries per oracle call after the first attempt.
    pub oracle_retries: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: crate::constants::MAX_TOOL_CALLS,
            max_concurrent: 4,
            oracle_timeout_secs: 60,
            oracle_retries: 1,
        }
    }
}

/// LLM provider configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: ProviderName,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: ProviderName::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

/// Remote code-host configuration for issue/PR fetching.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// `owner/repo` slug on the code host.
    pub repo: Option<String>,
    pub token: Option<String>,
    /// REST API base URL, for GitHub Enterprise installs.
    pub api_base: String,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("repo", &self.repo)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            repo: None,
            token: None,
            api_base: "https://api.github.com".to_string(),
        }
    }
}

impl Config {
    /// Load configuration with proper layering.
    ///
    /// Reads from global config, repo-local config, then applies
    /// environment variable overrides.
    pub fn load(repo_root: Option<&Path>, env: &Env) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Layer 4: global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                config.merge(global);
            }
        }

        // Layer 3: repo-local config
        if let Some(root) = repo_root {
            let local_path = root.join(crate::constants::CONFIG_FILENAME);
            if local_path.exists() {
                let local = Self::load_file(&local_path)?;
                config.merge(local);
            }
        }

        // Layer 2: environment variables
        config.apply_env_vars(env);

        Ok(config)
    }

    /// Load a config from a specific file.
    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the global config file path.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(crate::constants::CONFIG_DIR).join("config.toml"))
    }

    /// Merge another config into this one (other takes precedence for
    /// non-default values).
    fn merge(&mut self, other: Config) {
        let di = IndexConfig::default();
        if other.index.chunk_lines != di.chunk_lines {
            self.index.chunk_lines = other.index.chunk_lines;
        }
        if other.index.chunk_min_lines != di.chunk_min_lines {
            self.index.chunk_min_lines = other.index.chunk_min_lines;
        }
        if other.index.tags {
            self.index.tags = true;
        }
        if !other.index.exclude_dirs.is_empty() {
            self.index.exclude_dirs = other.index.exclude_dirs;
        }

        let dr = RetrievalConfig::default();
        if other.retrieval.top_k != dr.top_k {
            self.retrieval.top_k = other.retrieval.top_k;
        }
        if other.retrieval.relevance_floor != dr.relevance_floor {
            self.retrieval.relevance_floor = other.retrieval.relevance_floor;
        }

        let do_ = OrchestratorConfig::default();
        if other.orchestrator.max_tool_calls != do_.max_tool_calls {
            self.orchestrator.max_tool_calls = other.orchestrator.max_tool_calls;
        }
        if other.orchestrator.max_concurrent != do_.max_concurrent {
            self.orchestrator.max_concurrent = other.orchestrator.max_concurrent;
        }
        if other.orchestrator.oracle_timeout_secs != do_.oracle_timeout_secs {
            self.orchestrator.oracle_timeout_secs = other.orchestrator.oracle_timeout_secs;
        }
        if other.orchestrator.oracle_retries != do_.oracle_retries {
            self.orchestrator.oracle_retries = other.orchestrator.oracle_retries;
        }

        let dp = ProviderConfig::default();
        if other.provider.name != dp.name {
            self.provider.name = other.provider.name;
        }
        if other.provider.model != dp.model {
            self.provider.model = other.provider.model;
        }
        if other.provider.base_url.is_some() {
            self.provider.base_url = other.provider.base_url;
        }
        if other.provider.api_key.is_some() {
            self.provider.api_key = other.provider.api_key;
        }

        if other.remote.repo.is_some() {
            self.remote.repo = other.remote.repo;
        }
        if other.remote.token.is_some() {
            self.remote.token = other.remote.token;
        }
        if other.remote.api_base != RemoteConfig::default().api_base {
            self.remote.api_base = other.remote.api_base;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_vars(&mut self, env: &Env) {
        if let Some(val) = env.var_opt(crate::constants::ENV_PROVIDER) {
            if let Ok(name) = val.parse::<ProviderName>() {
                self.provider.name = name;
            } else {
                eprintln!(
                    "Warning: ignoring invalid {} value: {val}",
                    crate::constants::ENV_PROVIDER
                );
            }
        }
        if let Some(val) = env.var_opt(crate::constants::ENV_MODEL) {
            self.provider.model = val;
        }
        if let Some(val) = env.var_opt(crate::constants::ENV_BASE_URL) {
            self.provider.base_url = Some(val);
        }

        // Provider-specific API key resolution
        let api_key = env
            .var_opt(crate::constants::ENV_API_KEY)
            .or_else(|| env.var_opt(self.provider.name.api_key_env_var()));
        if api_key.is_some() {
            self.provider.api_key = api_key;
        }

        if let Some(val) = env.var_opt(crate::constants::ENV_GITHUB_TOKEN) {
            self.remote.token = Some(val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.index.chunk_lines, 40);
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.orchestrator.max_tool_calls, 6);
        assert_eq!(config.provider.name, ProviderName::Anthropic);
        assert!(!config.index.tags);
    }

    #[test]
    fn merge_overrides_non_defaults_only() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.retrieval.top_k = 25;
        other.remote.repo = Some("acme/widgets".into());
        base.merge(other);
        assert_eq!(base.retrieval.top_k, 25);
        assert_eq!(base.remote.repo.as_deref(), Some("acme/widgets"));
        // Untouched fields keep their defaults
        assert_eq!(base.orchestrator.max_concurrent, 4);
    }

    #[test]
    fn env_overrides_provider_and_model() {
        let mut config = Config::default();
        let env = Env::mock([
            ("CITED_PROVIDER", "gemini"),
            ("CITED_MODEL", "gemini-2.5-flash"),
            ("GEMINI_API_KEY", "key123"),
        ]);
        config.apply_env_vars(&env);
        assert_eq!(config.provider.name, ProviderName::Gemini);
        assert_eq!(config.provider.model, "gemini-2.5-flash");
        assert_eq!(config.provider.api_key.as_deref(), Some("key123"));
    }

    #[test]
    fn env_invalid_provider_is_ignored() {
        let mut config = Config::default();
        let env = Env::mock([("CITED_PROVIDER", "not-a-provider")]);
        config.apply_env_vars(&env);
        assert_eq!(config.provider.name, ProviderName::Anthropic);
    }

    #[test]
    fn env_github_token_applies() {
        let mut config = Config::default();
        let env = Env::mock([("GITHUB_TOKEN", "ghp_abc")]);
        config.apply_env_vars(&env);
        assert_eq!(config.remote.token.as_deref(), Some("ghp_abc"));
    }

    #[test]
    fn load_file_parses_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".cited.toml");
        std::fs::write(
            &path,
            "[retrieval]\ntop_k = 5\n\n[provider]\nmodel = \"gpt-4o\"\n",
        )
        .unwrap();
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.provider.model, "gpt-4o");
    }

    #[test]
    fn load_file_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".cited.toml");
        std::fs::write(&path, "this is not toml [[[").unwrap();
        assert!(matches!(
            Config::load_file(&path),
            Err(ConfigError::ParseFile { .. })
        ));
    }
}
