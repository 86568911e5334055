//! Deterministic lexical retrieval over the chunk index.
//!
//! Scoring is term frequency with a fixed boost ladder on top; ordering is
//! total (score, then path, then start line) so the same query against the
//! same epoch always returns the same ranked list. An optional semantic
//! scorer can be blended in without changing the tie-break rules.

use thiserror::Error;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::index::lexical::tokenize;
use crate::index::RepoIndex;
use crate::models::ChunkId;

/// Boost per query token that exactly matches a path segment.
const PATH_SEGMENT_BOOST: f64 = 2.0;
/// Boost for orientation documents on orientation-style queries.
const ORIENTATION_BOOST: f64 = 1.5;
/// Boost per query token found in the chunk's tag.
const TAG_BOOST: f64 = 1.0;
/// Penalty per path component, so shallow files win exact ties in spirit
/// before the lexicographic tie-break applies.
const DEPTH_PENALTY: f64 = 0.01;

#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error("invalid path filter pattern: {0}")]
    InvalidGlob(#[from] globset::Error),
}

/// Optional filters narrowing the searched chunk population.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Glob patterns matched against repo-relative paths.
    pub path_globs: Vec<String>,
    /// Lowercase extensions, e.g. `["rs", "py"]`. Empty means all.
    pub extensions: Vec<String>,
    /// Only documentation files (markdown and friends, docs/ tree).
    pub docs_only: bool,
    /// Only non-documentation files.
    pub code_only: bool,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.path_globs.is_empty() && self.extensions.is_empty() && !self.docs_only && !self.code_only
    }

    fn compile_globs(&self) -> Result<Option<GlobSet>, RetrieveError> {
        if self.path_globs.is_empty() {
            return Ok(None);
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.path_globs {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Some(builder.build()?))
    }
}

/// A scored search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub chunk: ChunkId,
    pub score: f64,
}

/// Hook for blending an embedding-based score into the lexical ranking.
///
/// The blended score is `lexical + weight * semantic`; determinism then
/// depends on the implementation being deterministic too.
pub trait SemanticScorer: Send + Sync {
    fn score(&self, query: &str, chunk_text: &str) -> f64;
    fn weight(&self) -> f64;
}

/// Rank chunks for a query. Returns at most `top_k` hits with positive
/// scores, best first.
pub fn search(
    query: &str,
    filters: &SearchFilters,
    index: &RepoIndex,
    top_k: usize,
    semantic: Option<&dyn SemanticScorer>,
) -> Result<Vec<RankedChunk>, RetrieveError> {
    let query_tokens: Vec<String> = tokenize(query).collect();
    if query_tokens.is_empty() || top_k == 0 {
        return Ok(Vec::new());
    }
    let globs = filters.compile_globs()?;
    let orientation = is_orientation_query(query);

    let mut scored: Vec<RankedChunk> = Vec::new();
    for chunk in index.chunks() {
        let Some(file) = index.file(&chunk.file_path) else {
            continue;
        };
        if !passes_filters(filters, globs.as_ref(), file) {
            continue;
        }

        let mut score = lexical_score(&query_tokens, chunk.id, index);
        score += boost(&query_tokens, chunk, file, orientation);
        if score <= 0.0 {
            continue;
        }
        score -= DEPTH_PENALTY * file.depth() as f64;
        if let Some(semantic) = semantic {
            score += semantic.weight() * semantic.score(query, &chunk.text);
        }
        scored.push(RankedChunk {
            chunk: chunk.id,
            score,
        });
    }

    // Total order: score desc, then path asc, then start line asc
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ca = index.chunk(a.chunk).expect("scored chunk exists");
                let cb = index.chunk(b.chunk).expect("scored chunk exists");
                ca.file_path
                    .cmp(&cb.file_path)
                    .then(ca.start_line.cmp(&cb.start_line))
            })
    });
    scored.truncate(top_k);
    Ok(scored)
}

fn passes_filters(
    filters: &SearchFilters,
    globs: Option<&GlobSet>,
    file: &crate::models::FileRecord,
) -> bool {
    if file.is_binary {
        return false;
    }
    if let Some(globs) = globs {
        if !globs.is_match(&file.path) {
            return false;
        }
    }
    if !filters.extensions.is_empty() && !filters.extensions.contains(&file.extension) {
        return false;
    }
    if filters.docs_only && !file.is_doc() {
        return false;
    }
    if filters.code_only && file.is_doc() {
        return false;
    }
    true
}

/// Term-frequency score: summed query-token frequency, normalized by the
/// chunk's token count so long chunks do not dominate on volume alone.
fn lexical_score(query_tokens: &[String], chunk: ChunkId, index: &RepoIndex) -> f64 {
    let total = index.lexical.chunk_token_count(chunk);
    if total == 0 {
        return 0.0;
    }
    let mut hits = 0u32;
    for token in query_tokens {
        for posting in index.lexical.postings(token) {
            if posting.chunk == chunk {
                hits += posting.frequency;
            }
        }
    }
    if hits == 0 {
        return 0.0;
    }
    // Dampened length normalization keeps scores comparable across chunk sizes
    f64::from(hits) / f64::from(total).sqrt()
}

/// The fixed boost ladder, applied in a stable order.
fn boost(
    query_tokens: &[String],
    chunk: &crate::models::Chunk,
    file: &crate::models::FileRecord,
    orientation: bool,
) -> f64 {
    let mut total = 0.0;

    let segments: Vec<String> = file
        .path
        .split('/')
        .map(|s| {
            s.rsplit_once('.')
                .map_or(s, |(stem, _)| stem)
                .to_lowercase()
        })
        .collect();
    for token in query_tokens {
        if segments.iter().any(|s| s == token) {
            total += PATH_SEGMENT_BOOST;
        }
    }

    if orientation && file.is_doc() && file.depth() == 0 {
        total += ORIENTATION_BOOST;
    }

    if let Some(tag) = &chunk.tag {
        let tag = tag.to_lowercase();
        for token in query_tokens {
            if tag.contains(token.as_str()) {
                total += TAG_BOOST;
            }
        }
    }

    total
}

/// Whether a query asks for orientation rather than a specific feature.
pub fn is_orientation_query(query: &str) -> bool {
    let q = query.to_lowercase();
    const MARKERS: &[&str] = &[
        "what does this",
        "what is this",
        "overview",
        "explain this project",
        "explain the project",
        "purpose of this",
        "architecture",
        "how is this organized",
        "getting started",
    ];
    MARKERS.iter().any(|m| q.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use std::path::Path;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn sample_index(dir: &Path) -> RepoIndex {
        write(
            dir,
            "src/auth/login.py",
            "def authenticate(user, password):\n    return check_password(user, password)\n",
        );
        write(
            dir,
            "src/billing/invoice.py",
            "def render_invoice(order):\n    return template(order)\n",
        );
        write(dir, "README.md", "# Demo\nA small demo app with login and billing.\n");
        write(dir, "docs/auth.md", "How authentication works.\n");
        let (index, _) = crate::index::ingest(dir, &IndexConfig::default()).unwrap();
        index
    }

    fn paths(index: &RepoIndex, hits: &[RankedChunk]) -> Vec<String> {
        hits.iter()
            .map(|h| index.chunk(h.chunk).unwrap().file_path.clone())
            .collect()
    }

    #[test]
    fn path_segment_match_outranks_body_mention() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample_index(dir.path());

        let hits = search("login authentication", &SearchFilters::default(), &index, 10, None)
            .unwrap();
        assert_eq!(
            paths(&index, &hits)[0],
            "src/auth/login.py",
            "path-segment boost should put login.py first, got {:?}",
            paths(&index, &hits)
        );
    }

    #[test]
    fn orientation_query_prefers_top_level_docs() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample_index(dir.path());

        let hits = search(
            "what does this demo app do? overview please",
            &SearchFilters::default(),
            &index,
            10,
            None,
        )
        .unwrap();
        assert_eq!(paths(&index, &hits)[0], "README.md");
    }

    #[test]
    fn no_match_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample_index(dir.path());
        let hits = search("kubernetes operator", &SearchFilters::default(), &index, 10, None)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn extension_and_glob_filters_narrow_results() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample_index(dir.path());

        let filters = SearchFilters {
            extensions: vec!["md".into()],
            ..Default::default()
        };
        let hits = search("login", &filters, &index, 10, None).unwrap();
        assert!(paths(&index, &hits).iter().all(|p| p.ends_with(".md")));

        let filters = SearchFilters {
            path_globs: vec!["src/billing/**".into()],
            ..Default::default()
        };
        let hits = search("invoice", &filters, &index, 10, None).unwrap();
        assert_eq!(paths(&index, &hits), vec!["src/billing/invoice.py"]);
    }

    #[test]
    fn docs_only_and_code_only() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample_index(dir.path());

        let filters = SearchFilters {
            docs_only: true,
            ..Default::default()
        };
        let hits = search("authentication", &filters, &index, 10, None).unwrap();
        assert!(paths(&index, &hits).iter().all(|p| p.ends_with(".md")));

        let filters = SearchFilters {
            code_only: true,
            ..Default::default()
        };
        let hits = search("authentication", &filters, &index, 10, None).unwrap();
        assert!(paths(&index, &hits).iter().all(|p| p.ends_with(".py")));
    }

    #[test]
    fn invalid_glob_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample_index(dir.path());
        let filters = SearchFilters {
            path_globs: vec!["src/[".into()],
            ..Default::default()
        };
        assert!(matches!(
            search("login", &filters, &index, 10, None),
            Err(RetrieveError::InvalidGlob(_))
        ));
    }

    #[test]
    fn ranking_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample_index(dir.path());
        let a = search("login billing demo", &SearchFilters::default(), &index, 10, None).unwrap();
        let b = search("login billing demo", &SearchFilters::default(), &index, 10, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn equal_scores_break_ties_by_path_then_line() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "needle\n");
        write(dir.path(), "b.txt", "needle\n");
        let (index, _) = crate::index::ingest(dir.path(), &IndexConfig::default()).unwrap();

        let hits = search("needle", &SearchFilters::default(), &index, 10, None).unwrap();
        assert_eq!(paths(&index, &hits), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn top_k_caps_results() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..8 {
            write(dir.path(), &format!("f{i}.txt"), "needle here\n");
        }
        let (index, _) = crate::index::ingest(dir.path(), &IndexConfig::default()).unwrap();
        let hits = search("needle", &SearchFilters::default(), &index, 3, None).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn semantic_scorer_blends_in() {
        struct FavorInvoice;
        impl SemanticScorer for FavorInvoice {
            fn score(&self, _query: &str, chunk_text: &str) -> f64 {
                if chunk_text.contains("invoice") {
                    1.0
                } else {
                    0.0
                }
            }
            fn weight(&self) -> f64 {
                10.0
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let index = sample_index(dir.path());
        let hits = search(
            "login billing",
            &SearchFilters::default(),
            &index,
            10,
            Some(&FavorInvoice),
        )
        .unwrap();
        assert_eq!(paths(&index, &hits)[0], "src/billing/invoice.py");
    }
}
