//! Filesystem-backed local tree.

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use jwalk::{Parallelism, WalkDir};
use rayon::prelude::*;
use tidesync_core::{ContentHash, IgnoreRules, ObjectKind, PathMapper, SyncPath};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CollaboratorError;
use crate::tree::{LocalItem, LocalTree, LocalWalk};

#[derive(Debug, Clone, Copy)]
struct CachedFingerprint {
    size: u64,
    modified: SystemTime,
    hash: ContentHash,
}

/// Local tree read straight from disk.
///
/// Files are hashed with BLAKE3. Hashes are cached by path and reused while
/// size and modification time stay the same, so unchanged files are not
/// re-read on every cycle. Symlinks are not synchronized and are skipped.
///
/// The walk always runs on its own thread pool (or serially), so it can be
/// started from inside another rayon job.
#[derive(Debug)]
pub struct FsLocalTree {
    mapper: PathMapper,
    cache: DashMap<SyncPath, CachedFingerprint>,
    threads: usize,
}

struct Pending {
    path: SyncPath,
    local: PathBuf,
    kind: ObjectKind,
    size: u64,
    modified: Option<SystemTime>,
}

impl FsLocalTree {
    /// Create a tree rooted at the mapper's local root.
    pub fn new(mapper: PathMapper) -> Self {
        Self {
            mapper,
            cache: DashMap::new(),
            threads: 0,
        }
    }

    /// Threads used to read directories (0 = auto-detect, 1 = serial).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// The local root directory.
    pub fn root(&self) -> &Path {
        self.mapper.local_root()
    }

    /// Number of cached fingerprints.
    pub fn cached_fingerprints(&self) -> usize {
        self.cache.len()
    }

    fn parallelism(&self) -> Parallelism {
        match self.threads {
            1 => Parallelism::Serial,
            n => Parallelism::RayonNewPool(n),
        }
    }

    fn pending(&self, path: SyncPath, local: PathBuf, metadata: &Metadata) -> Option<Pending> {
        let kind = if metadata.is_dir() {
            ObjectKind::Folder
        } else if metadata.is_file() {
            ObjectKind::File
        } else {
            debug!(path = %local.display(), "Skipping special file");
            return None;
        };
        Some(Pending {
            path,
            local,
            kind,
            size: if kind.is_file() { metadata.len() } else { 0 },
            modified: metadata.modified().ok(),
        })
    }

    fn finish(&self, pending: Pending) -> LocalItem {
        let fingerprint = match pending.kind {
            ObjectKind::File => self.fingerprint(&pending),
            ObjectKind::Folder => None,
        };
        LocalItem {
            path: pending.path,
            kind: pending.kind,
            size: pending.size,
            modified: pending.modified.map(DateTime::<Utc>::from),
            fingerprint,
        }
    }

    fn fingerprint(&self, pending: &Pending) -> Option<ContentHash> {
        if let (Some(modified), Some(hit)) = (pending.modified, self.cache.get(&pending.path)) {
            if hit.size == pending.size && hit.modified == modified {
                return Some(hit.hash);
            }
        }

        match hash_file(&pending.local) {
            Ok(hash) => {
                if let Some(modified) = pending.modified {
                    self.cache.insert(
                        pending.path.clone(),
                        CachedFingerprint {
                            size: pending.size,
                            modified,
                            hash,
                        },
                    );
                }
                Some(hash)
            }
            Err(e) => {
                // Locked or vanished mid-walk; treated as unchanged this cycle.
                warn!(path = %pending.local.display(), error = %e, "Cannot hash file");
                None
            }
        }
    }
}

impl LocalTree for FsLocalTree {
    fn children(&self, dir: &SyncPath) -> Result<Vec<LocalItem>, CollaboratorError> {
        let local_dir = self.mapper.relative_to_local(dir);
        let read = std::fs::read_dir(&local_dir).map_err(|e| CollaboratorError::io(&local_dir, e))?;

        let mut pending = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| CollaboratorError::io(&local_dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!(dir = %local_dir.display(), "Skipping non UTF-8 file name");
                continue;
            };
            let Ok(path) = dir.join(name) else {
                warn!(dir = %local_dir.display(), name, "Skipping unusable file name");
                continue;
            };
            let local = entry.path();
            let metadata = std::fs::symlink_metadata(&local).map_err(|e| CollaboratorError::io(&local, e))?;
            pending.extend(self.pending(path, local, &metadata));
        }

        let mut items: Vec<LocalItem> = pending.into_par_iter().map(|p| self.finish(p)).collect();
        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(items)
    }

    fn walk(
        &self,
        rules: &IgnoreRules,
        cancel: &CancellationToken,
    ) -> Result<LocalWalk, CollaboratorError> {
        let root = self.mapper.local_root().to_path_buf();
        let filter_rules = Arc::new(rules.clone());
        let filter_mapper = self.mapper.clone();

        let walker = WalkDir::new(&root)
            .parallelism(self.parallelism())
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
            .process_read_dir(move |_depth, _dir, _state, children| {
                children.retain(|entry| match entry {
                    Ok(entry) => filter_mapper
                        .local_to_relative(&entry.path())
                        .is_ok_and(|path| !filter_rules.is_ignored(&path)),
                    Err(_) => true,
                });
            });

        let mut pending = Vec::new();
        let mut unreadable = Vec::new();
        for entry in walker {
            if cancel.is_cancelled() {
                debug!(root = %root.display(), "Local walk cancelled");
                return Ok(LocalWalk::default());
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(CollaboratorError::transient(format!(
                        "Cannot walk {}",
                        root.display()
                    ))
                    .with_source(e));
                }
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    let path = e.path().and_then(|p| self.mapper.local_to_relative(p).ok());
                    unreadable.extend(path.filter(|path| !path.is_root()));
                    continue;
                }
            };
            if let Some(e) = &entry.read_children_error {
                if entry.depth == 0 {
                    return Err(CollaboratorError::transient(format!(
                        "Cannot list {}",
                        root.display()
                    )));
                }
                warn!(path = %entry.path().display(), error = %e, "Skipping unreadable folder");
                if let Ok(path) = self.mapper.local_to_relative(&entry.path()) {
                    unreadable.push(path);
                }
                continue;
            }
            if entry.depth == 0 {
                continue;
            }
            if entry.file_type().is_symlink() {
                debug!(path = %entry.path().display(), "Skipping symlink");
                continue;
            }

            let local = entry.path();
            let path = match self.mapper.local_to_relative(&local) {
                Ok(path) => path,
                Err(e) => {
                    warn!(path = %local.display(), error = %e, "Skipping unmappable path");
                    continue;
                }
            };
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = %local.display(), error = %e, "Cannot stat entry");
                    unreadable.push(path);
                    continue;
                }
            };
            pending.extend(self.pending(path, local, &metadata));
        }

        let items: Vec<LocalItem> = pending.into_par_iter().map(|p| self.finish(p)).collect();

        let seen: std::collections::HashSet<&SyncPath> = items.iter().map(|i| &i.path).collect();
        self.cache.retain(|path, _| seen.contains(path));
        unreadable.sort();
        unreadable.dedup();
        debug!(
            items = items.len(),
            unreadable = unreadable.len(),
            cached = self.cache.len(),
            "Walked local tree"
        );
        Ok(LocalWalk { items, unreadable })
    }
}

fn hash_file(path: &Path) -> io::Result<ContentHash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap_rayon(path)?;
    Ok(ContentHash::new(*hasher.finalize().as_bytes()))
}
