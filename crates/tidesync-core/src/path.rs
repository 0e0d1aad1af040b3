//! Sync-root relative paths.

use std::fmt;
use std::str::FromStr;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A normalized path relative to a sync root.
///
/// Components are separated by `/`, there is no leading or trailing
/// separator, and `.`/`..`/empty components are rejected. The empty
/// string is the root itself. Because both trees are addressed relative
/// to their roots, the same `SyncPath` names an item on either side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SyncPath(CompactString);

impl SyncPath {
    /// The sync root.
    pub fn root() -> Self {
        Self(CompactString::default())
    }

    /// Parse and validate a relative path. Surrounding separators are trimmed.
    pub fn new(path: &str) -> Result<Self, CoreError> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        for component in trimmed.split('/') {
            validate_component(trimmed, component)?;
        }
        Ok(Self(CompactString::new(trimmed)))
    }

    /// Check if this is the sync root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Final component, `None` for the root.
    pub fn name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Parent path, `None` for the root.
    pub fn parent(&self) -> Option<SyncPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(CompactString::new(&self.0[..idx]))),
            None => Some(Self::root()),
        }
    }

    /// Append a single component.
    pub fn join(&self, name: &str) -> Result<SyncPath, CoreError> {
        validate_component(name, name)?;
        if self.is_root() {
            Ok(Self(CompactString::new(name)))
        } else {
            Ok(Self(compact_str::format_compact!("{}/{}", self.0, name)))
        }
    }

    /// Iterate over the components.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// Number of components (0 for the root).
    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// Component-aware prefix test: `a/b` starts with `a` but not with `a/bc`'s `a/b`.
    pub fn starts_with(&self, prefix: &SyncPath) -> bool {
        if prefix.is_root() {
            return true;
        }
        match self.0.strip_prefix(prefix.0.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Check if both paths share the same parent.
    pub fn is_sibling_of(&self, other: &SyncPath) -> bool {
        self.parent() == other.parent()
    }

    /// Replace the `from` prefix with `to`. `None` if `from` is not a prefix.
    pub fn rebase(&self, from: &SyncPath, to: &SyncPath) -> Option<SyncPath> {
        if !self.starts_with(from) {
            return None;
        }
        let rest = self.0[from.0.len()..].trim_start_matches('/');
        if rest.is_empty() {
            Some(to.clone())
        } else if to.is_root() {
            Some(Self(rest.into()))
        } else {
            Some(Self(format!("{}/{}", to.0, rest).into()))
        }
    }
}

fn validate_component(path: &str, component: &str) -> Result<(), CoreError> {
    match component {
        "" => Err(CoreError::invalid_path(path, "empty component")),
        "." | ".." => Err(CoreError::invalid_path(path, "relative component")),
        c if c.contains('/') => Err(CoreError::invalid_path(path, "separator in name")),
        c if c.contains('\0') => Err(CoreError::invalid_path(path, "NUL in name")),
        _ => Ok(()),
    }
}

impl fmt::Display for SyncPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl FromStr for SyncPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SyncPath {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<SyncPath> for String {
    fn from(value: SyncPath) -> Self {
        value.0.into_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> SyncPath {
        SyncPath::new(s).unwrap()
    }

    #[test]
    fn test_normalizes_separators() {
        assert_eq!(p("/docs/a.txt/").as_str(), "docs/a.txt");
        assert!(p("/").is_root());
        assert!(p("").is_root());
    }

    #[test]
    fn test_rejects_bad_components() {
        assert!(SyncPath::new("a//b").is_err());
        assert!(SyncPath::new("a/../b").is_err());
        assert!(SyncPath::new("./a").is_err());
    }

    #[test]
    fn test_parent_and_name() {
        let path = p("docs/reports/q1.xlsx");
        assert_eq!(path.name(), Some("q1.xlsx"));
        assert_eq!(path.parent(), Some(p("docs/reports")));
        assert_eq!(p("top").parent(), Some(SyncPath::root()));
        assert_eq!(SyncPath::root().parent(), None);
        assert_eq!(SyncPath::root().name(), None);
    }

    #[test]
    fn test_join() {
        assert_eq!(SyncPath::root().join("a").unwrap(), p("a"));
        assert_eq!(p("a").join("b").unwrap(), p("a/b"));
        assert!(p("a").join("b/c").is_err());
        assert!(p("a").join("..").is_err());
    }

    #[test]
    fn test_starts_with_is_component_aware() {
        assert!(p("a/b/c").starts_with(&p("a/b")));
        assert!(p("a/b").starts_with(&p("a/b")));
        assert!(!p("a/bc").starts_with(&p("a/b")));
        assert!(p("anything").starts_with(&SyncPath::root()));
    }

    #[test]
    fn test_rebase() {
        assert_eq!(p("a/b/c").rebase(&p("a/b"), &p("x")), Some(p("x/c")));
        assert_eq!(p("a/b").rebase(&p("a/b"), &p("x/y")), Some(p("x/y")));
        assert_eq!(p("a/b").rebase(&p("a"), &SyncPath::root()), Some(p("b")));
        assert_eq!(p("a/bc").rebase(&p("a/b"), &p("x")), None);
    }

    #[test]
    fn test_depth_and_siblings() {
        assert_eq!(SyncPath::root().depth(), 0);
        assert_eq!(p("a/b/c").depth(), 3);
        assert!(p("a/x").is_sibling_of(&p("a/y")));
        assert!(!p("a/x").is_sibling_of(&p("b/x")));
    }

    #[test]
    fn test_serde_validates() {
        let ok: SyncPath = serde_json::from_str("\"a/b\"").unwrap();
        assert_eq!(ok, p("a/b"));
        assert!(serde_json::from_str::<SyncPath>("\"a/../b\"").is_err());
    }
}
