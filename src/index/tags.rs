//! Best-effort descriptive tags for files and directories.
//!
//! Tag generation is an enrichment pass that runs after ingestion. It
//! batches files to the reasoning engine, attaches the returned tags to
//! files and their chunks, then rolls tags up into per-directory labels.
//! Any failure leaves the affected files untagged; tags never gate
//! correctness anywhere else.

use std::collections::BTreeMap;

use crate::oracle::{FileTagRequest, ReasoningEngine};

use super::RepoIndex;

/// Files per tagging call. Keeps prompts small enough that one bad file
/// cannot poison a large batch.
const BATCH_SIZE: usize = 20;

/// Max snippet lines sent per file.
const SNIPPET_LINES: usize = 15;

/// Outcome counts for one tagging pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagReport {
    pub tagged: usize,
    pub untagged: usize,
    pub failed_batches: usize,
}

/// Tag every text file in the index, batch by batch.
///
/// A failed batch is logged to the report and skipped; the pass always
/// completes. Directory tags are rolled up afterwards from whatever file
/// tags were produced.
pub async fn generate_tags(index: &mut RepoIndex, oracle: &dyn ReasoningEngine) -> TagReport {
    let mut report = TagReport::default();

    let candidates: Vec<(String, String)> = index
        .files()
        .iter()
        .filter(|f| !f.is_binary && !f.chunk_ids.is_empty())
        .map(|f| {
            let snippet = f
                .chunk_ids
                .first()
                .and_then(|&id| index.chunk(id))
                .map(|c| snippet_of(&c.text))
                .unwrap_or_default();
            (f.path.clone(), snippet)
        })
        .collect();

    for batch in candidates.chunks(BATCH_SIZE) {
        let requests: Vec<FileTagRequest> = batch
            .iter()
            .map(|(path, snippet)| FileTagRequest {
                path: path.clone(),
                snippet: snippet.clone(),
            })
            .collect();

        match oracle.tag_files(&requests).await {
            Ok(tags) => {
                for ((path, _), tag) in batch.iter().zip(tags) {
                    match tag {
                        Some(tag) if !tag.trim().is_empty() => {
                            index.set_file_tag(path, tag.trim().to_string());
                            report.tagged += 1;
                        }
                        _ => report.untagged += 1,
                    }
                }
            }
            Err(_) => {
                report.failed_batches += 1;
                report.untagged += batch.len();
            }
        }
    }

    index.dir_tags = roll_up(index);
    report
}

/// First lines of a chunk, enough for the engine to identify the file.
fn snippet_of(text: &str) -> String {
    text.lines().take(SNIPPET_LINES).collect::<Vec<_>>().join("\n")
}

/// Fold file tags up into directory labels.
///
/// A directory's label joins the distinct tags of its direct children
/// (files and subdirectories), capped at three. Deepest directories are
/// folded first so labels propagate toward the root.
fn roll_up(index: &RepoIndex) -> std::collections::HashMap<String, String> {
    // BTreeMap keys sort parents before children; iterate in reverse for
    // a bottom-up fold.
    let mut child_tags: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for file in index.files() {
        let Some(tag) = &file.tag else { continue };
        let Some((dir, _)) = file.path.rsplit_once('/') else {
            continue;
        };
        child_tags.entry(dir.to_string()).or_default().push(tag.clone());
    }

    let dirs: Vec<String> = child_tags.keys().cloned().collect();
    for dir in dirs.iter().rev() {
        let label = join_tags(&child_tags[dir]);
        if let Some((parent, _)) = dir.rsplit_once('/') {
            child_tags
                .entry(parent.to_string())
                .or_default()
                .push(label);
        }
    }

    child_tags
        .into_iter()
        .map(|(dir, tags)| (dir, join_tags(&tags)))
        .collect()
}

/// Distinct tags joined with "; ", at most three.
fn join_tags(tags: &[String]) -> String {
    let mut seen = Vec::new();
    for tag in tags {
        if !seen.contains(tag) {
            seen.push(tag.clone());
        }
        if seen.len() == 3 {
            break;
        }
    }
    seen.join("; ")
}
