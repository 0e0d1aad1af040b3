//! Local/remote path translation.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::path::SyncPath;

/// Stateless translation between local filesystem paths and remote
/// repository paths by root-prefix substitution.
///
/// Both directions go through [`SyncPath`], so mapping local -> remote ->
/// local (or the reverse) returns the original path for anything under
/// the configured roots. Paths outside a root are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapper {
    local_root: PathBuf,
    remote_root: String,
}

impl PathMapper {
    /// Create a mapper. The remote root must be absolute (`/Sites/docs`).
    pub fn new(local_root: impl Into<PathBuf>, remote_root: &str) -> Result<Self, CoreError> {
        let local_root = local_root.into();
        if local_root.as_os_str().is_empty() {
            return Err(CoreError::InvalidConfig {
                message: "local root cannot be empty".to_string(),
            });
        }
        if !remote_root.starts_with('/') {
            return Err(CoreError::InvalidConfig {
                message: format!("remote root '{remote_root}' must start with '/'"),
            });
        }
        let trimmed = remote_root.trim_end_matches('/');
        // Validates the components of the remote root.
        SyncPath::new(trimmed)?;
        let remote_root = if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        };
        Ok(Self {
            local_root,
            remote_root,
        })
    }

    /// The local root directory.
    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// The remote root folder path.
    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    /// Convert an absolute local path into a sync-relative path.
    pub fn local_to_relative(&self, local: &Path) -> Result<SyncPath, CoreError> {
        let outside = || CoreError::OutsideRoot {
            path: local.display().to_string(),
            root: self.local_root.display().to_string(),
        };
        let rest = local.strip_prefix(&self.local_root).map_err(|_| outside())?;

        let mut path = SyncPath::root();
        for component in rest.components() {
            match component {
                Component::Normal(name) => {
                    let name = name.to_str().ok_or_else(|| CoreError::NonUtf8Path {
                        path: local.to_path_buf(),
                    })?;
                    path = path.join(name)?;
                }
                _ => return Err(outside()),
            }
        }
        Ok(path)
    }

    /// Convert a sync-relative path into an absolute local path.
    pub fn relative_to_local(&self, path: &SyncPath) -> PathBuf {
        let mut local = self.local_root.clone();
        for component in path.components() {
            local.push(component);
        }
        local
    }

    /// Convert an absolute remote path into a sync-relative path.
    pub fn remote_to_relative(&self, remote: &str) -> Result<SyncPath, CoreError> {
        let outside = || CoreError::OutsideRoot {
            path: remote.to_string(),
            root: self.remote_root.clone(),
        };
        if !remote.starts_with('/') {
            return Err(outside());
        }
        let rest = if self.remote_root == "/" {
            remote
        } else {
            let rest = remote.strip_prefix(self.remote_root.as_str()).ok_or_else(outside)?;
            if !rest.is_empty() && !rest.starts_with('/') {
                return Err(outside());
            }
            rest
        };
        SyncPath::new(rest)
    }

    /// Convert a sync-relative path into an absolute remote path.
    pub fn relative_to_remote(&self, path: &SyncPath) -> String {
        match (path.is_root(), self.remote_root.as_str()) {
            (true, root) => root.to_string(),
            (false, "/") => format!("/{}", path.as_str()),
            (false, root) => format!("{root}/{}", path.as_str()),
        }
    }

    /// Translate a local path to the corresponding remote path.
    pub fn local_to_remote(&self, local: &Path) -> Result<String, CoreError> {
        Ok(self.relative_to_remote(&self.local_to_relative(local)?))
    }

    /// Translate a remote path to the corresponding local path.
    pub fn remote_to_local(&self, remote: &str) -> Result<PathBuf, CoreError> {
        Ok(self.relative_to_local(&self.remote_to_relative(remote)?))
    }
}
