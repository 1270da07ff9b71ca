//! # Module Paths
//!
//! Structured identifiers for modules in the store tree.
//!
//! ```text
//! root            []                  ""
//! carrinho        ["carrinho"]        "carrinho"
//! carrinho/promo  ["carrinho","promo"] "carrinho/promo"
//! ```
//!
//! Paths are segment sequences, never raw strings, so that joining and
//! prefix checks cannot be fooled by a segment containing a separator.

use serde::{Deserialize, Serialize};

/// Separator used when rendering paths and qualified names.
pub const SEPARATOR: char = '/';

/// Path of a module in the store tree. The root module has no segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    /// The root path.
    pub fn root() -> Self {
        ModulePath(Vec::new())
    }

    /// Builds a path from segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ModulePath(segments.into_iter().map(Into::into).collect())
    }

    /// Parses `a/b/c`. Empty segments are dropped, so `""` is the root.
    pub fn parse(raw: &str) -> Self {
        ModulePath(
            raw.split(SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Last segment (the module's own name). `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Parent path. `None` for the root.
    pub fn parent(&self) -> Option<ModulePath> {
        if self.is_root() {
            None
        } else {
            Some(ModulePath(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> ModulePath {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        ModulePath(segments)
    }

    /// True if `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &ModulePath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Validates that no segment is empty or contains the separator.
    pub fn is_valid(&self) -> bool {
        self.0
            .iter()
            .all(|s| !s.is_empty() && !s.contains(SEPARATOR))
    }
}

impl std::fmt::Display for ModulePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl From<&str> for ModulePath {
    fn from(raw: &str) -> Self {
        ModulePath::parse(raw)
    }
}

impl From<&[&str]> for ModulePath {
    fn from(segments: &[&str]) -> Self {
        ModulePath::new(segments.iter().copied())
    }
}

/// Joins a namespace and a local name into a qualified handler name.
///
/// ```rust
/// use vitrine_store::path::{qualify, ModulePath};
///
/// assert_eq!(qualify(&ModulePath::parse("carrinho"), "addItem"), "carrinho/addItem");
/// assert_eq!(qualify(&ModulePath::root(), "fullName"), "fullName");
/// ```
pub fn qualify(namespace: &ModulePath, local: &str) -> String {
    if namespace.is_root() {
        local.to_string()
    } else {
        format!("{}{}{}", namespace, SEPARATOR, local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path = ModulePath::parse("carrinho/promo");
        assert_eq!(path.segments(), &["carrinho".to_string(), "promo".to_string()]);
        assert_eq!(path.to_string(), "carrinho/promo");
        assert!(ModulePath::parse("").is_root());
        assert!(ModulePath::parse("/").is_root());
    }

    #[test]
    fn test_parent_and_child() {
        let path = ModulePath::parse("a/b");
        assert_eq!(path.parent(), Some(ModulePath::parse("a")));
        assert_eq!(ModulePath::parse("a").parent(), Some(ModulePath::root()));
        assert_eq!(ModulePath::root().parent(), None);
        assert_eq!(ModulePath::root().child("a").child("b"), path);
        assert_eq!(path.name(), Some("b"));
    }

    #[test]
    fn test_prefix() {
        let root = ModulePath::root();
        let a = ModulePath::parse("a");
        let ab = ModulePath::parse("a/b");
        let ac = ModulePath::parse("ac");

        assert!(root.is_prefix_of(&ab));
        assert!(a.is_prefix_of(&ab));
        assert!(ab.is_prefix_of(&ab));
        assert!(!ab.is_prefix_of(&a));
        assert!(!a.is_prefix_of(&ac));
    }

    #[test]
    fn test_validity() {
        assert!(ModulePath::new(["a", "b"]).is_valid());
        assert!(!ModulePath::new(["a/b"]).is_valid());
        assert!(!ModulePath::new([""]).is_valid());
    }
}
