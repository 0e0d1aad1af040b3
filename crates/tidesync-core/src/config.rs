//! Sync-root configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ignore::IgnoreList;
use crate::mapper::PathMapper;
use crate::path::SyncPath;

/// How the session provider authenticates against the remote endpoint.
///
/// The core only passes this through; it never inspects credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    Basic,
    Ntlm,
    Kerberos,
    OAuth,
}

/// Configuration for one synchronized folder pair.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SyncRootConfig {
    /// Display name of the sync root.
    pub name: String,

    /// Local directory being synchronized.
    pub local_root: PathBuf,

    /// Remote folder path being synchronized (absolute, `/`-separated).
    pub remote_root: String,

    /// Remote repository endpoint URL.
    pub endpoint: String,

    /// Root-relative path prefixes that are never synchronized.
    #[builder(default)]
    #[serde(default)]
    pub ignored_prefixes: Vec<String>,

    /// File-name globs that are never synchronized.
    #[builder(default = "default_ignored_names()")]
    #[serde(default = "default_ignored_names")]
    pub ignored_names: Vec<String>,

    /// Seconds between scheduled crawls.
    #[builder(default = "default_poll_interval_secs()")]
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Authentication scheme selector.
    #[builder(default)]
    #[serde(default)]
    pub auth: AuthType,

    /// Threads for the local walk (0 = auto-detect, 1 = serial).
    #[builder(default)]
    #[serde(default)]
    pub walk_threads: usize,
}

/// Office lock files and editor temporaries.
fn default_ignored_names() -> Vec<String> {
    vec!["~$*".to_string(), "*.tmp".to_string(), ".~lock.*".to_string()]
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn check(local_root: &Path, remote_root: &str, poll_interval_secs: u64) -> Result<(), String> {
    if local_root.as_os_str().is_empty() {
        return Err("Local root cannot be empty".to_string());
    }
    if !remote_root.starts_with('/') {
        return Err(format!("Remote root '{remote_root}' must be absolute"));
    }
    if poll_interval_secs == 0 {
        return Err("Poll interval must be at least one second".to_string());
    }
    Ok(())
}

impl SyncRootConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        let Some(ref local_root) = self.local_root else {
            return Err("Local root is required".to_string());
        };
        let Some(ref remote_root) = self.remote_root else {
            return Err("Remote root is required".to_string());
        };
        check(
            local_root,
            remote_root,
            self.poll_interval_secs
                .unwrap_or_else(default_poll_interval_secs),
        )
    }
}

impl SyncRootConfig {
    /// Create a new sync root config builder.
    pub fn builder() -> SyncRootConfigBuilder {
        SyncRootConfigBuilder::default()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, CoreError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate a config that did not go through the builder.
    pub fn validate(&self) -> Result<(), CoreError> {
        check(&self.local_root, &self.remote_root, self.poll_interval_secs)
            .map_err(|message| CoreError::InvalidConfig { message })
    }

    /// Interval between scheduled crawls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Path mapper for this root.
    pub fn mapper(&self) -> Result<PathMapper, CoreError> {
        PathMapper::new(&self.local_root, &self.remote_root)
    }

    /// Runtime-editable ignore list seeded from this config.
    pub fn ignore_list(&self) -> Result<IgnoreList, CoreError> {
        let prefixes = self
            .ignored_prefixes
            .iter()
            .map(|p| SyncPath::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(IgnoreList::new(prefixes, self.ignored_names.clone()))
    }
}
