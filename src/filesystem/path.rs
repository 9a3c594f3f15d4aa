//! Tree path handling. A path is a `/`-joined list of node names walked from
//! the roots; it never starts or ends with a separator.

pub const SEPARATOR: char = '/';

/// Splits a path into its segments.
///
/// Returns `None` when the path cannot address any node: the empty path, or a
/// path with an empty segment (`"a//b"`, `"/a"`, `"a/"`).
pub fn split(path: &str) -> Option<Vec<&str>> {
    let segments: Vec<&str> = path.split(SEPARATOR).collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return None;
    }
    Some(segments)
}

/// Splits a path into its parent segments and the leaf name.
pub fn split_leaf(path: &str) -> Option<(Vec<&str>, &str)> {
    let mut segments = split(path)?;
    let leaf = segments.pop()?;
    Some((segments, leaf))
}

pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}{SEPARATOR}{name}")
    }
}
