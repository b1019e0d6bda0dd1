//! Path normalisation and splitting.
//!
//! Paths are plain UTF-8 strings. Normalisation collapses repeated slashes
//! and drops `.` components; `..` components are kept verbatim because they
//! must be resolved against the directory graph (a `..` following a symlink
//! names the link target's parent, not the textual one).

/// `true` when the path starts at the filesystem root.
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// `true` when the path is resolved against the current directory.
pub fn is_relative(path: &str) -> bool {
    !is_absolute(path)
}

/// Collapse `//` runs and `.` components, preserving `..` and the leading
/// slash. The empty path normalises to itself.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    if is_absolute(path) {
        out.push('/');
    }
    let mut first = true;
    for component in path.split('/') {
        if component.is_empty() || component == "." {
            continue;
        }
        if !first {
            out.push('/');
        }
        out.push_str(component);
        first = false;
    }
    out
}

/// Split a path into its components, skipping empty ones and `.`.
pub fn split(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .map(str::to_owned)
        .collect()
}

/// Split off the final component: `"a/b/c"` becomes `("a/b", "c")`.
///
/// The directory part of a single component is empty (resolving to the
/// current directory); the directory part of `"/c"` is `"/"`.
pub fn split_file_name(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(is_absolute("/a/b"));
        assert!(is_relative("a/b"));
        assert!(is_relative(""));
    }

    #[test]
    fn normalize_collapses_slashes_and_dots() {
        assert_eq!(normalize("//a///b/./c"), "/a/b/c");
        assert_eq!(normalize("a/./b/"), "a/b");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn normalize_keeps_parent_components() {
        assert_eq!(normalize("a/../b"), "a/../b");
        assert_eq!(normalize("/a/b/.."), "/a/b/..");
    }

    #[test]
    fn normalize_is_idempotent() {
        for p in ["//a//./b", "a/../b//", "/", "", "x/./././y"] {
            let once = normalize(p);
            assert_eq!(normalize(&once), once, "path {p:?}");
        }
    }

    #[test]
    fn split_components() {
        assert_eq!(split("/a//b/./c"), ["a", "b", "c"]);
        assert!(split("/").is_empty());
        assert!(split("").is_empty());
    }

    #[test]
    fn split_file_name_cases() {
        assert_eq!(split_file_name("a/b/c"), ("a/b", "c"));
        assert_eq!(split_file_name("/c"), ("/", "c"));
        assert_eq!(split_file_name("c"), ("", "c"));
        assert_eq!(split_file_name("/a/b"), ("/a", "b"));
    }
}
