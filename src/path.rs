use crate::SvnError;

use std::borrow::Cow;

fn canonicalize_rel_path(path: &str, allow_empty: bool) -> Result<Cow<'_, str>, SvnError> {
    let raw = path.trim();

    #[cfg(windows)]
    if raw.starts_with("\\\\") {
        return Err(SvnError::InvalidPath("unsafe path".into()));
    }

    let trimmed = raw.trim_matches(['/', '\\']);

    if trimmed.is_empty() {
        if allow_empty {
            return Ok(Cow::Borrowed(""));
        }
        return Err(SvnError::InvalidPath("empty path".into()));
    }

    if trimmed.contains('\0') {
        return Err(SvnError::InvalidPath("unsafe path".into()));
    }

    let mut parts: Vec<&str> = Vec::new();
    let mut needs_alloc = trimmed.contains('\\');

    for seg in trimmed.split(['/', '\\']) {
        if seg.is_empty() || seg == "." {
            needs_alloc = true;
            continue;
        }
        if seg == ".." {
            return Err(SvnError::InvalidPath(format!("path escapes its base: {path}")));
        }
        parts.push(seg);
    }

    if parts.is_empty() {
        if allow_empty {
            return Ok(Cow::Borrowed(""));
        }
        return Err(SvnError::InvalidPath("empty path".into()));
    }

    if !needs_alloc {
        return Ok(Cow::Borrowed(trimmed));
    }

    Ok(Cow::Owned(parts.join("/")))
}

/// Canonicalizes a relpath naming a file; the empty path is rejected.
pub(crate) fn validate_rel_path(path: &str) -> Result<String, SvnError> {
    Ok(canonicalize_rel_path(path, false)?.into_owned())
}

/// Canonicalizes a relpath naming a directory or any node; `""` is the base itself.
pub(crate) fn validate_rel_dir_path(path: &str) -> Result<String, SvnError> {
    Ok(canonicalize_rel_path(path, true)?.into_owned())
}

/// Joins two canonical relpaths.
pub(crate) fn join(base: &str, child: &str) -> String {
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{child}"),
    }
}

/// Returns the remainder of `child` below `parent`, or `None` if `child` is
/// not `parent` or one of its descendants.
pub(crate) fn skip_ancestor<'a>(parent: &str, child: &'a str) -> Option<&'a str> {
    if parent.is_empty() {
        return Some(child);
    }
    let rest = child.strip_prefix(parent)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}

/// Splits a canonical relpath into its parent and basename.
pub(crate) fn split(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((dir, base)) => (dir, base),
        None => ("", path),
    }
}

/// Converts a canonical relpath into a repository fspath (leading `/`).
pub(crate) fn to_fspath(relpath: &str) -> String {
    format!("/{relpath}")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn validate_rel_path_rejects_empty_path() {
        let err = validate_rel_path("  / ").unwrap_err();
        assert!(matches!(err, SvnError::InvalidPath(_)));
    }

    #[test]
    fn validate_rel_path_rejects_parent_dir() {
        assert!(validate_rel_path("../a.txt").is_err());
        assert!(validate_rel_path("a/../b.txt").is_err());
        assert!(validate_rel_dir_path("../").is_err());
    }

    #[test]
    fn validate_rel_path_normalizes_slashes_and_curdir() {
        assert_eq!(validate_rel_path("/trunk/a.txt").unwrap(), "trunk/a.txt");
        assert_eq!(validate_rel_path("trunk/").unwrap(), "trunk");
        assert_eq!(
            validate_rel_path("//trunk//./a.txt").unwrap(),
            "trunk/a.txt"
        );
        assert_eq!(
            validate_rel_path("trunk\\sub\\.\\a.txt").unwrap(),
            "trunk/sub/a.txt"
        );
    }

    #[test]
    fn validate_rel_dir_path_allows_empty_root() {
        assert_eq!(validate_rel_dir_path("").unwrap(), "");
        assert_eq!(validate_rel_dir_path("/").unwrap(), "");
        assert_eq!(validate_rel_dir_path("./").unwrap(), "");
    }

    #[test]
    fn skip_ancestor_is_segment_based() {
        assert_eq!(skip_ancestor("trunk", "trunk/a/b"), Some("a/b"));
        assert_eq!(skip_ancestor("trunk", "trunk"), Some(""));
        assert_eq!(skip_ancestor("", "trunk"), Some("trunk"));
        assert_eq!(skip_ancestor("trunk", "trunk2/a"), None);
        assert_eq!(skip_ancestor("trunk/a", "trunk"), None);
    }

    #[test]
    fn join_and_split_are_inverse() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a", ""), "a");
        assert_eq!(join("a/b", "c"), "a/b/c");
        assert_eq!(split("a/b/c"), ("a/b", "c"));
        assert_eq!(split("a"), ("", "a"));
        assert_eq!(to_fspath("a/b"), "/a/b");
        assert_eq!(to_fspath(""), "/");
    }
}
