//! Colored terminal rendering of an envelope.

use colored::Colorize;

use crate::models::{RequestStatus, ResponseEnvelope};

pub fn render(envelope: &ResponseEnvelope) -> String {
    let mut out = String::new();

    match envelope.status {
        RequestStatus::Answered => {}
        RequestStatus::Insufficient => {
            out.push_str(&format!("{}\n\n", "insufficient evidence".yellow().bold()));
        }
        RequestStatus::Failed => {
            out.push_str(&format!("{}\n\n", "request failed".red().bold()));
        }
    }

    out.push_str(envelope.answer.trim_end());
    out.push('\n');

    if let Some(patch) = &envelope.patch {
        out.push_str(&format!("\n{}\n", "Proposed patch".bold()));
        for line in patch.lines() {
            let colored = if line.starts_with('+') && !line.starts_with("+++") {
                line.green().to_string()
            } else if line.starts_with('-') && !line.starts_with("---") {
                line.red().to_string()
            } else {
                line.to_string()
            };
            out.push_str(&colored);
            out.push('\n');
        }
    }

    if !envelope.citations.is_empty() {
        out.push_str(&format!("\n{}\n", "Citations".bold()));
        for citation in &envelope.citations {
            out.push_str(&format!(
                "  [{}] {}  {}\n",
                citation.id.to_string().cyan(),
                citation.location,
                citation.snippet.dimmed()
            ));
        }
    }

    if !envelope.next_actions.is_empty() {
        out.push_str(&format!("\n{}\n", "Next actions".bold()));
        for action in &envelope.next_actions {
            out.push_str(&format!("  - {action}\n"));
        }
    }

    out
}
