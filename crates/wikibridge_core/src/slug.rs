//! Page path normalization.
//!
//! A page path is `segment(/segment)*` where every segment is lowercase alphanumeric runs
//! joined by single hyphens.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::error::{BridgeError, BridgeResult};

pub const PATH_SEPARATOR: char = '/';

/// Turn a human title into a single path segment. Combining marks left over after
/// lowercasing are dropped, so `İ` becomes `i`.
pub fn normalize(title: &str) -> BridgeResult<String> {
    let mut out = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    let chars = title
        .nfc()
        .flat_map(char::to_lowercase)
        .filter(|ch| !is_combining_mark(*ch));
    for ch in chars {
        if ch.is_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(ch);
        } else {
            pending_hyphen = true;
        }
    }
    if out.is_empty() {
        return Err(BridgeError::InvalidTitle {
            title: title.to_string(),
        });
    }
    Ok(out)
}

/// Normalize every segment of a raw `/`-separated path. Empty segments are dropped, so
/// `" Docs // API "` becomes `docs/api`. An empty input stays empty.
pub fn normalize_path(raw: &str) -> BridgeResult<String> {
    let mut segments = Vec::new();
    for segment in raw.split(PATH_SEPARATOR) {
        if segment.trim().is_empty() {
            continue;
        }
        segments.push(normalize(segment)?);
    }
    Ok(segments.join("/"))
}

pub fn join(parent_path: &str, segment: &str) -> String {
    let parent = parent_path.trim_matches(PATH_SEPARATOR);
    let segment = segment.trim_matches(PATH_SEPARATOR);
    if parent.is_empty() {
        segment.to_string()
    } else if segment.is_empty() {
        parent.to_string()
    } else {
        format!("{parent}/{segment}")
    }
}

/// Ancestor paths from root to leaf, excluding the leaf: `a/b/c` gives `["a", "a/b"]`.
pub fn split(path: &str) -> Vec<String> {
    let segments = path
        .split(PATH_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    let mut out = Vec::with_capacity(segments.len().saturating_sub(1));
    for end in 1..segments.len() {
        out.push(segments[..end].join("/"));
    }
    out
}

pub fn parent_path(path: &str) -> &str {
    match path.rfind(PATH_SEPARATOR) {
        Some(index) => &path[..index],
        None => "",
    }
}

pub fn last_segment(path: &str) -> &str {
    match path.rfind(PATH_SEPARATOR) {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

/// Number of separators in the path; root-level pages have depth 0.
pub fn depth(path: &str) -> usize {
    path.matches(PATH_SEPARATOR).count()
}

/// `api-reference` becomes `Api Reference`.
pub fn title_from_segment(segment: &str) -> String {
    segment
        .split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_direct_child(parent: &str, candidate: &str) -> bool {
    if parent.is_empty() {
        return !candidate.is_empty() && !candidate.contains(PATH_SEPARATOR);
    }
    candidate
        .strip_prefix(parent)
        .and_then(|rest| rest.strip_prefix(PATH_SEPARATOR))
        .is_some_and(|rest| !rest.is_empty() && !rest.contains(PATH_SEPARATOR))
}
