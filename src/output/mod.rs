//! Rendering of response envelopes.

pub mod json;
pub mod terminal;

use crate::models::ResponseEnvelope;

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Terminal,
    Json,
}

/// Render an envelope in the requested format.
pub fn render(envelope: &ResponseEnvelope, format: OutputFormat) -> String {
    match format {
        OutputFormat::Terminal => terminal::render(envelope),
        OutputFormat::Json => json::render(envelope),
    }
}
