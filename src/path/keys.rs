//! Path Keys Module
//!
//! Parses dotted/bracket path strings into key sequences.

use std::borrow::Cow;
use std::fmt;

// == Path Key ==
/// One step of a nested path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathKey {
    /// Named key (object property, or a numeric string)
    Key(String),
    /// Explicit array position
    Index(usize),
}

impl PathKey {
    /// Returns true when the key addresses an array slot.
    ///
    /// Explicit indices always do; named keys do when they are all ASCII digits.
    pub fn looks_numeric(&self) -> bool {
        match self {
            PathKey::Index(_) => true,
            PathKey::Key(key) => !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()),
        }
    }

    /// Returns the array position this key addresses, if any.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathKey::Index(index) => Some(*index),
            PathKey::Key(key) if self.looks_numeric() => key.parse().ok(),
            PathKey::Key(_) => None,
        }
    }

    /// Returns the key as an object property name.
    pub fn as_name(&self) -> Cow<'_, str> {
        match self {
            PathKey::Key(key) => Cow::Borrowed(key),
            PathKey::Index(index) => Cow::Owned(index.to_string()),
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_name())
    }
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        PathKey::Key(key.to_string())
    }
}

impl From<String> for PathKey {
    fn from(key: String) -> Self {
        PathKey::Key(key)
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

// == Into Path ==
/// Anything that can be turned into an ordered key sequence.
pub trait IntoPath {
    fn into_path(self) -> Vec<PathKey>;
}

impl IntoPath for &str {
    fn into_path(self) -> Vec<PathKey> {
        parse_path(self)
    }
}

impl IntoPath for &String {
    fn into_path(self) -> Vec<PathKey> {
        parse_path(self)
    }
}

impl IntoPath for String {
    fn into_path(self) -> Vec<PathKey> {
        parse_path(&self)
    }
}

impl IntoPath for Vec<PathKey> {
    fn into_path(self) -> Vec<PathKey> {
        self
    }
}

impl IntoPath for &[PathKey] {
    fn into_path(self) -> Vec<PathKey> {
        self.to_vec()
    }
}

impl IntoPath for &Vec<PathKey> {
    fn into_path(self) -> Vec<PathKey> {
        self.clone()
    }
}

impl<const N: usize> IntoPath for [PathKey; N] {
    fn into_path(self) -> Vec<PathKey> {
        self.into()
    }
}

// == To Path ==
/// Converts a path into its key sequence.
///
/// Sequences are copied as-is. Strings have `[digits]` rewritten to `.digits`,
/// are split on `.`, and lose empty segments.
///
/// # Example
/// ```
/// use mini_memo::path::{to_path, PathKey};
///
/// assert_eq!(
///     to_path("a[0].b"),
///     vec![PathKey::from("a"), PathKey::from("0"), PathKey::from("b")]
/// );
/// ```
pub fn to_path(path: impl IntoPath) -> Vec<PathKey> {
    path.into_path()
}

fn parse_path(path: &str) -> Vec<PathKey> {
    rewrite_brackets(path)
        .split('.')
        .filter(|segment| !segment.is_empty())
        .map(PathKey::from)
        .collect()
}

/// Rewrites every `[digits]` group to `.digits`, leaving other brackets intact.
fn rewrite_brackets(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let digits = after.bytes().take_while(|b| b.is_ascii_digit()).count();

        if digits > 0 && after[digits..].starts_with(']') {
            out.push('.');
            out.push_str(&after[..digits]);
            rest = &after[digits + 1..];
        } else {
            out.push('[');
            rest = after;
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<PathKey> {
        names.iter().map(|n| PathKey::from(*n)).collect()
    }

    #[test]
    fn test_dotted_path() {
        assert_eq!(to_path("a.b.c"), keys(&["a", "b", "c"]));
    }

    #[test]
    fn test_bracket_notation() {
        assert_eq!(to_path("a[0].b[1]"), keys(&["a", "0", "b", "1"]));
    }

    #[test]
    fn test_mixed_notation() {
        assert_eq!(to_path("a.b[0].c"), keys(&["a", "b", "0", "c"]));
    }

    #[test]
    fn test_empty_segments_dropped() {
        assert_eq!(to_path("a..b"), keys(&["a", "b"]));
        assert_eq!(to_path(".a."), keys(&["a"]));
        assert!(to_path("").is_empty());
    }

    #[test]
    fn test_non_numeric_brackets_kept() {
        assert_eq!(to_path("a[x]"), keys(&["a[x]"]));
        assert_eq!(to_path("a[]"), keys(&["a[]"]));
    }

    #[test]
    fn test_sequence_passthrough() {
        let path = vec![PathKey::from("a"), PathKey::Index(0), PathKey::from("b")];
        assert_eq!(to_path(path.clone()), path);
        assert!(to_path(Vec::<PathKey>::new()).is_empty());
    }

    #[test]
    fn test_looks_numeric() {
        assert!(PathKey::Index(3).looks_numeric());
        assert!(PathKey::from("12").looks_numeric());
        assert!(!PathKey::from("1a").looks_numeric());
        assert!(!PathKey::from("").looks_numeric());
        assert_eq!(PathKey::from("7").as_index(), Some(7));
        assert_eq!(PathKey::from("x").as_index(), None);
    }
}
