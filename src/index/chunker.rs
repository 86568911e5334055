//! Line-bounded chunking with structural boundary detection.
//!
//! Files are split at function/class boundaries when simple language-aware
//! heuristics can find them; otherwise into fixed-size line windows. Chunk
//! ranges are 1-indexed, inclusive, non-overlapping, and cover the file in
//! order.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::IndexConfig;

/// Patterns that open a structural unit at low indentation.
///
/// Intentionally coarse: they only have to land chunk boundaries near
/// function/class starts, not parse the language.
static BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)^(
            (pub(\([^)]*\))?\s+)?(async\s+)?(unsafe\s+)?fn\s |
            (pub(\([^)]*\))?\s+)?(struct|enum|trait|impl|mod)\s |
            (async\s+)?def\s |
            class\s |
            func\s |
            (export\s+)?(default\s+)?(async\s+)?function[\s*(] |
            (export\s+)?(abstract\s+)?class\s |
            (public|private|protected|static)\s+[\w<>\[\]]+\s+\w+\s*\(
        )",
    )
    .expect("boundary regex is valid")
});

/// Maximum leading whitespace for a line to count as a structural boundary.
const MAX_BOUNDARY_INDENT: usize = 4;

/// Compute chunk ranges for a file's lines.
///
/// Returns 1-indexed inclusive `(start, end)` pairs. The result is never
/// empty for a non-empty file, ranges never overlap, and their union covers
/// `1..=lines.len()`.
pub fn chunk_ranges(lines: &[&str], config: &IndexConfig) -> Vec<(usize, usize)> {
    let total = lines.len();
    if total == 0 {
        return Vec::new();
    }
    // Small file: one chunk
    if total <= config.chunk_min_lines {
        return vec![(1, total)];
    }

    let boundaries = structural_boundaries(lines);
    let segments = if boundaries.len() >= 2 {
        segments_from_boundaries(&boundaries, total)
    } else {
        // No usable structure: fixed windows
        window_segments(total, config.chunk_lines)
    };

    // Split any oversized structural segment into windows
    let mut ranges = Vec::new();
    for (start, end) in segments {
        let len = end - start + 1;
        if len <= config.chunk_lines * 2 {
            ranges.push((start, end));
        } else {
            for (ws, we) in window_segments(len, config.chunk_lines) {
                ranges.push((start + ws - 1, start + we - 1));
            }
        }
    }
    ranges
}

/// 1-indexed line numbers where a structural unit begins.
fn structural_boundaries(lines: &[&str]) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            let indent = line.len() - line.trim_start().len();
            let trimmed = line.trim_start();
            (indent <= MAX_BOUNDARY_INDENT && BOUNDARY.is_match(trimmed)).then_some(i + 1)
        })
        .collect()
}

/// Turn boundary line numbers into covering segments.
///
/// The first segment starts at line 1 regardless of where the first
/// boundary falls, so leading imports/comments are not lost.
fn segments_from_boundaries(boundaries: &[usize], total: usize) -> Vec<(usize, usize)> {
    let mut segments = Vec::with_capacity(boundaries.len());
    let mut start = 1;
    for &b in boundaries {
        if b > start {
            // Close the running segment just before this boundary
            if b - 1 >= start {
                segments.push((start, b - 1));
            }
            start = b;
        }
    }
    segments.push((start, total));
    merge_tiny_segments(segments)
}

/// Merge segments shorter than 3 lines into their successor so boundary
/// noise does not produce confetti chunks.
fn merge_tiny_segments(segments: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(segments.len());
    for (start, end) in segments {
        if let Some(last) = merged.last_mut() {
            if last.1 - last.0 + 1 < 3 {
                last.1 = end;
                continue;
            }
        }
        merged.push((start, end));
    }
    merged
}

/// Fixed non-overlapping windows over `1..=total`.
fn window_segments(total: usize, window: usize) -> Vec<(usize, usize)> {
    let window = window.max(1);
    let mut segments = Vec::new();
    let mut start = 1;
    while start <= total {
        let end = (start + window - 1).min(total);
        segments.push((start, end));
        start = end + 1;
    }
    segments
}
