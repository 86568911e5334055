//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;
use crate::models::{Mode, ProviderName, Scope};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = crate::constants::APP_NAME,
    version = crate::constants::VERSION,
    about = "Evidence-grounded questions and answers about a code repository",
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask a question about the repository
    Ask(AskArgs),
    /// Index the repository and report what would be searchable
    Index(IndexArgs),
    /// Manage saved conversation sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question to answer
    pub query: String,

    /// Repository root to index and search
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Answer shape
    #[arg(long, value_enum, default_value = "explain")]
    pub mode: Mode,

    /// Tool scope for this request
    #[arg(long, value_enum, default_value = "include-remote")]
    pub scope: Scope,

    /// Named session to read context from and record the answer into
    #[arg(long)]
    pub session: Option<String>,

    /// Maximum ranked search results per tool call
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value = "terminal")]
    pub format: OutputFormat,

    /// Generate file tags before answering (extra oracle calls)
    #[arg(long)]
    pub tags: bool,

    /// Remote repository slug (owner/name) for issue and PR lookups
    #[arg(long)]
    pub repo_slug: Option<String>,

    /// LLM provider override
    #[arg(long, value_parser = clap::value_parser!(ProviderName))]
    pub provider: Option<ProviderName>,

    /// Model override
    #[arg(long)]
    pub model: Option<String>,

    /// Trace states and tool calls to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Repository root to index
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// List skipped files as well
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// List saved sessions
    List,
    /// Show a session's recent queries
    Show { name: String },
    /// Delete a session
    Clear { name: String },
}

impl AskArgs {
    /// Apply CLI overrides on top of the loaded config (highest layer).
    pub fn apply_to_config(&self, config: &mut Config) {
        if let Some(top_k) = self.top_k {
            config.retrieval.top_k = top_k;
        }
        if let Some(provider) = self.provider {
            config.provider.name = provider;
        }
        if let Some(model) = &self.model {
            config.provider.model = model.clone();
        }
        if let Some(slug) = &self.repo_slug {
            config.remote.repo = Some(slug.clone());
        }
        if self.tags {
            config.index.tags = true;
        }
    }
}

impl clap::builder::ValueParserFactory for ProviderName {
    type Parser = clap::builder::ValueParser;

    fn value_parser() -> Self::Parser {
        clap::builder::ValueParser::new(|s: &str| s.parse::<ProviderName>())
    }
}
