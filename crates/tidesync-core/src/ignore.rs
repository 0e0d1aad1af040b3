//! Ignored-path rules.

use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use parking_lot::RwLock;

use crate::error::CoreError;
use crate::path::SyncPath;

#[derive(Debug, Default)]
struct IgnoreSpec {
    prefixes: Vec<SyncPath>,
    name_patterns: Vec<String>,
}

/// Shared, runtime-editable ignore configuration for one sync root.
///
/// Clones share state. The crawler calls [`IgnoreList::snapshot`] at the
/// start of each cycle, so edits apply to the next cycle without a
/// restart.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    inner: Arc<RwLock<IgnoreSpec>>,
}

impl IgnoreList {
    /// Create an ignore list from path prefixes and name globs.
    pub fn new(prefixes: Vec<SyncPath>, name_patterns: Vec<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(IgnoreSpec {
                prefixes,
                name_patterns,
            })),
        }
    }

    /// Add a path prefix. Returns `false` if it was already present.
    pub fn add_prefix(&self, prefix: SyncPath) -> bool {
        let mut spec = self.inner.write();
        if spec.prefixes.contains(&prefix) {
            return false;
        }
        spec.prefixes.push(prefix);
        true
    }

    /// Remove a path prefix. Returns `false` if it was not present.
    pub fn remove_prefix(&self, prefix: &SyncPath) -> bool {
        let mut spec = self.inner.write();
        let before = spec.prefixes.len();
        spec.prefixes.retain(|p| p != prefix);
        spec.prefixes.len() != before
    }

    /// Add a file-name glob such as `~$*` or `*.tmp`.
    pub fn add_name_pattern(&self, pattern: impl Into<String>) {
        self.inner.write().name_patterns.push(pattern.into());
    }

    /// Current path prefixes, in insertion order.
    pub fn prefixes(&self) -> Vec<SyncPath> {
        self.inner.read().prefixes.clone()
    }

    /// Compile the current configuration.
    pub fn snapshot(&self) -> Result<IgnoreRules, CoreError> {
        let spec = self.inner.read();
        IgnoreRules::new(spec.prefixes.clone(), &spec.name_patterns)
    }
}

/// Compiled ignore rules for a single crawl.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    prefixes: Vec<SyncPath>,
    names: GlobSet,
}

impl IgnoreRules {
    /// Rules that ignore nothing.
    pub fn none() -> Self {
        Self {
            prefixes: Vec::new(),
            names: GlobSet::empty(),
        }
    }

    /// Compile prefixes and name globs.
    pub fn new(prefixes: Vec<SyncPath>, name_patterns: &[String]) -> Result<Self, CoreError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in name_patterns {
            let glob = Glob::new(pattern).map_err(|source| CoreError::InvalidIgnorePattern {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let names = builder.build().map_err(|source| CoreError::InvalidIgnorePattern {
            pattern: name_patterns.join(", "),
            source,
        })?;
        Ok(Self { prefixes, names })
    }

    /// Check if a path, or any of its ancestors, is ignored.
    ///
    /// The sync root itself is never ignored.
    pub fn is_ignored(&self, path: &SyncPath) -> bool {
        if path.is_root() {
            return false;
        }
        if self
            .prefixes
            .iter()
            .any(|prefix| !prefix.is_root() && path.starts_with(prefix))
        {
            return true;
        }
        !self.names.is_empty() && path.components().any(|name| self.names.is_match(name))
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> SyncPath {
        SyncPath::new(s).unwrap()
    }

    #[test]
    fn test_prefix_is_component_aware() {
        let rules = IgnoreRules::new(vec![p("build")], &[]).unwrap();
        assert!(rules.is_ignored(&p("build")));
        assert!(rules.is_ignored(&p("build/out.o")));
        assert!(!rules.is_ignored(&p("builder/x")));
        assert!(!rules.is_ignored(&SyncPath::root()));
    }

    #[test]
    fn test_name_patterns_apply_to_any_component() {
        let rules =
            IgnoreRules::new(Vec::new(), &["~$*".to_string(), "*.tmp".to_string()]).unwrap();
        assert!(rules.is_ignored(&p("docs/~$report.docx")));
        assert!(rules.is_ignored(&p("cache.tmp/inner.txt")));
        assert!(!rules.is_ignored(&p("docs/report.docx")));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = IgnoreRules::new(Vec::new(), &["[".to_string()]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidIgnorePattern { .. }));
    }

    #[test]
    fn test_list_edits_show_up_in_next_snapshot() {
        let list = IgnoreList::default();
        let handle = list.clone();
        assert!(!list.snapshot().unwrap().is_ignored(&p("secret/a")));

        assert!(handle.add_prefix(p("secret")));
        assert!(!handle.add_prefix(p("secret")));
        assert!(list.snapshot().unwrap().is_ignored(&p("secret/a")));

        assert!(handle.remove_prefix(&p("secret")));
        assert!(!list.snapshot().unwrap().is_ignored(&p("secret/a")));
        assert!(list.prefixes().is_empty());
    }
}
