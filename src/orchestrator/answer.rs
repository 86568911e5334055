//! Post-processing of synthesized answers.
//!
//! Handles the three text extractions the envelope needs: citation marker
//! validation, unified-diff extraction for patch answers, and "Next
//! Actions" bullet extraction. The diff is pass-through only, never
//! validated against the repository.

use std::sync::LazyLock;

use regex::Regex;

use crate::evidence::EvidenceStore;
use crate::models::EvidenceId;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[E:([A-Za-z0-9_-]+)\]").expect("marker regex is valid"));

static DIFF_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```diff\s*\n(.*?)```").expect("diff regex is valid")
});

/// Outcome of citation post-validation.
#[derive(Debug)]
pub struct ValidatedAnswer {
    /// Answer text with unknown markers stripped.
    pub text: String,
    /// Valid cited ids, ordered by first appearance in the answer.
    pub cited: Vec<EvidenceId>,
    /// True when at least one unknown marker was removed.
    pub repaired: bool,
}

/// Validate `[E:<id>]` markers against the evidence store.
///
/// Markers citing unknown ids are stripped from the text; markers citing
/// known ids are kept verbatim. The engine is never re-prompted for this.
pub fn validate_citations(answer: &str, store: &EvidenceStore) -> ValidatedAnswer {
    let mut cited: Vec<EvidenceId> = Vec::new();
    let mut repaired = false;

    let mut text = String::with_capacity(answer.len());
    let mut last = 0;
    for caps in MARKER.captures_iter(answer) {
        let Some(whole) = caps.get(0) else { continue };
        let id = EvidenceId(caps[1].to_string());
        if store.contains(&id) {
            if !cited.contains(&id) {
                cited.push(id);
            }
            text.push_str(&answer[last..whole.end()]);
            last = whole.end();
        } else {
            repaired = true;
            // Swallow one space adjacent to the stripped marker; everything
            // else, fenced code included, passes through untouched.
            let mut start = whole.start();
            let mut end = whole.end();
            if answer[last..start].ends_with(' ') {
                start -= 1;
            } else if answer[end..].starts_with(' ') {
                end += 1;
            }
            text.push_str(&answer[last..start]);
            last = end;
        }
    }
    text.push_str(&answer[last..]);

    ValidatedAnswer {
        text,
        cited,
        repaired,
    }
}

/// First ```diff fenced block in the answer, if any.
pub fn extract_patch(answer: &str) -> Option<String> {
    DIFF_BLOCK
        .captures(answer)
        .map(|caps| caps[1].trim_end().to_string())
        .filter(|diff| !diff.is_empty())
}

/// Bullets under a "Next Actions" heading, markers stripped.
pub fn extract_next_actions(answer: &str) -> Vec<String> {
    let mut actions = Vec::new();
    let mut in_section = false;
    for line in answer.lines() {
        let trimmed = line.trim();
        if !in_section {
            let lowered = trimmed.trim_start_matches(['#', '*', ' ']).to_lowercase();
            if lowered.starts_with("next actions") || lowered.starts_with("next steps") {
                in_section = true;
            }
            continue;
        }
        if let Some(item) = bullet_text(trimmed) {
            actions.push(item);
        } else if !trimmed.is_empty() {
            // Section ends at the first non-bullet paragraph
            break;
        }
    }
    actions
}

/// Strip a leading bullet or numbered-list marker.
fn bullet_text(line: &str) -> Option<String> {
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some(rest.trim().to_string());
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return Some(rest.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::models::{Provenance, ToolName};
    use std::sync::Arc;

    fn store_with_two_items() -> EvidenceStore {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def a():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("b.py"), "def b():\n    pass\n").unwrap();
        let (index, _) = crate::index::ingest(dir.path(), &IndexConfig::default()).unwrap();
        let mut store = EvidenceStore::new(Arc::new(index));
        for path in ["a.py", "b.py"] {
            let chunk = store.index().file(path).unwrap().chunk_ids[0];
            store
                .add_chunk(
                    chunk,
                    Provenance {
                        tool: ToolName::SearchRepo,
                        rank: 0,
                    },
                    1.0,
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn valid_markers_are_kept_in_order() {
        let store = store_with_two_items();
        let result = validate_citations("B first [E:e2]. Then A [E:e1]. A again [E:e1].", &store);
        assert!(!result.repaired);
        assert!(result.text.contains("[E:e2]"));
        let ids: Vec<&str> = result.cited.iter().map(|id| id.0.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1"]);
    }

    #[test]
    fn unknown_markers_are_stripped() {
        let store = store_with_two_items();
        let result = validate_citations("Real [E:e1]. Fabricated [E:e9].", &store);
        assert!(result.repaired);
        assert!(!result.text.contains("e9"));
        assert!(result.text.contains("[E:e1]"));
        assert_eq!(result.cited.len(), 1);
    }

    #[test]
    fn repair_does_not_disturb_fenced_code() {
        let store = store_with_two_items();
        let answer = "Fix the check [E:e9].\n\n\
                      ```diff\n--- a/x.py\n+++ b/x.py\n@@ -1,2 +1,2 @@\n\
                      -    old()\n+    new()\n```\n";
        let result = validate_citations(answer, &store);
        assert!(result.repaired);
        assert!(result.text.starts_with("Fix the check.\n"));

        let patch = extract_patch(&result.text).unwrap();
        assert!(patch.contains("-    old()"));
        assert!(patch.contains("+    new()"));
    }

    #[test]
    fn answer_with_no_markers() {
        let store = store_with_two_items();
        let result = validate_citations("No citations here at all.", &store);
        assert!(!result.repaired);
        assert!(result.cited.is_empty());
        assert_eq!(result.text, "No citations here at all.");
    }

    #[test]
    fn patch_extraction() {
        let answer = "Explanation first.\n\n```diff\n--- a/x.py\n+++ b/x.py\n@@ -1 +1 @@\n-old\n+new\n```\n";
        let patch = extract_patch(answer).unwrap();
        assert!(patch.starts_with("--- a/x.py"));
        assert!(patch.ends_with("+new"));

        assert!(extract_patch("no diff block").is_none());
        assert!(extract_patch("```diff\n```").is_none());
    }

    #[test]
    fn next_actions_extraction() {
        let answer = "Summary text.\n\n## Next Actions\n- Add tests for login\n* Refactor session cache\n3. Review PR #7\n\nTrailing prose.";
        assert_eq!(
            extract_next_actions(answer),
            vec![
                "Add tests for login",
                "Refactor session cache",
                "Review PR #7"
            ]
        );
        assert!(extract_next_actions("no such section").is_empty());
    }
}
