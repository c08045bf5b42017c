//! Materialized path helpers.
//!
//! A task's path is the `/`-joined list of codes from its root down to
//! itself (`PROJ-001/DEV-001/API-001`). Descendants are found by prefix
//! (`self.path + "/"`), ancestors by the leading segments, so neither
//! needs a recursive query.

use crate::error::{EngineError, Result};

pub const SEPARATOR: char = '/';

/// Path of a task with `code` placed under `parent_path` (or as a root).
pub fn child_path(parent_path: Option<&str>, code: &str) -> String {
    match parent_path {
        Some(parent) => format!("{}{}{}", parent, SEPARATOR, code),
        None => code.to_string(),
    }
}

/// Level implied by a path: segment count minus one.
pub fn level_of(path: &str) -> u32 {
    path.split(SEPARATOR).count().saturating_sub(1) as u32
}

/// Prefix shared by every descendant of the task at `path`.
pub fn descendant_prefix(path: &str) -> String {
    format!("{}{}", path, SEPARATOR)
}

/// Codes of the strict ancestors encoded in `path`, root first.
pub fn ancestor_codes(path: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = path.split(SEPARATOR).collect();
    segments.pop();
    segments
}

/// Swap `old_root` for `new_root` at the front of a descendant path.
///
/// Returns `None` when `path` is not strictly below `old_root`.
pub fn rebase(path: &str, old_root: &str, new_root: &str) -> Option<String> {
    let rest = path.strip_prefix(old_root)?;
    if !rest.starts_with(SEPARATOR) {
        return None;
    }
    Some(format!("{}{}", new_root, rest))
}

/// Reject codes that would corrupt the path encoding.
pub fn validate_code(code: &str) -> Result<()> {
    if code.is_empty() {
        return Err(EngineError::InvalidArgument(
            "task code must not be empty".to_string(),
        ));
    }
    if code.contains(SEPARATOR) || code.chars().any(char::is_whitespace) {
        return Err(EngineError::InvalidArgument(format!(
            "task code '{}' must not contain '/' or whitespace",
            code
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_path_and_level() {
        let root = child_path(None, "PROJ-001");
        let mid = child_path(Some(&root), "DEV-001");
        let leaf = child_path(Some(&mid), "API-001");
        assert_eq!(leaf, "PROJ-001/DEV-001/API-001");
        assert_eq!(level_of(&root), 0);
        assert_eq!(level_of(&mid), 1);
        assert_eq!(level_of(&leaf), 2);
    }

    #[test]
    fn test_ancestor_codes() {
        assert_eq!(
            ancestor_codes("PROJ-001/DEV-001/API-001"),
            vec!["PROJ-001", "DEV-001"]
        );
        assert!(ancestor_codes("PROJ-001").is_empty());
    }

    #[test]
    fn test_rebase_requires_segment_boundary() {
        assert_eq!(
            rebase("A-1/B-1/C-1", "A-1/B-1", "X-1/B-1").as_deref(),
            Some("X-1/B-1/C-1")
        );
        // `A-10` is a sibling of `A-1`, not a descendant.
        assert_eq!(rebase("A-10/B-1", "A-1", "Z-1"), None);
        assert_eq!(rebase("A-1", "A-1", "Z-1"), None);
    }

    #[test]
    fn test_validate_code() {
        assert!(validate_code("API-001").is_ok());
        assert!(validate_code("").is_err());
        assert!(validate_code("A/B").is_err());
        assert!(validate_code("A B").is_err());
    }
}
