//! Tree crawling and change correlation for tidesync.
//!
//! # Overview
//!
//! `tidesync-crawl` walks the local and remote trees of one sync root,
//! compares both with the identity store and emits a
//! [`CrawlEventCollection`]. Key features:
//!
//! - **Parallel local walk** via jwalk/rayon, with cached BLAKE3 hashes
//! - **Identity-based remote correlation**, so remote renames and moves are
//!   reported directly
//! - **Rename/move pairing** for the local side, where only paths and
//!   content are known
//! - **Progress updates** via broadcast channels
//! - **Ignore rules** re-read at the start of every crawl
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use tidesync_core::{IgnoreList, ObjectId, PathMapper};
//! use tidesync_crawl::{Crawler, FsLocalTree, JsonRemoteTree};
//! use tidesync_store::MemoryIdentityStore;
//! use tokio_util::sync::CancellationToken;
//!
//! let mapper = PathMapper::new("/home/me/Sync", "/Sites/docs").unwrap();
//! let crawler = Crawler::new(
//!     Arc::new(MemoryIdentityStore::with_root(ObjectId::new("root"))),
//!     Arc::new(FsLocalTree::new(mapper)),
//!     Arc::new(JsonRemoteTree::open(Path::new("remote.json")).unwrap()),
//!     IgnoreList::default(),
//! );
//!
//! let events = crawler.crawl(&CancellationToken::new()).unwrap();
//! println!("{} events, {} rename candidates", events.len(), events.mergeable().len());
//! ```

mod correlate;
mod crawler;
mod error;
mod fs;
mod progress;
mod remote_json;
mod tree;

pub use crawler::Crawler;
pub use error::{CollaboratorError, CrawlError};
pub use fs::FsLocalTree;
pub use progress::{CrawlPhase, CrawlProgress};
pub use remote_json::{JsonRemoteTree, RemoteSnapshotFile};
pub use tree::{
    LocalItem, LocalSnapshot, LocalTree, LocalWalk, RemoteEntry, RemoteItem, RemoteSnapshot, RemoteTree,
    SessionHandle, walk_local, walk_remote,
};

// Re-export core types for convenience
pub use tidesync_core::{CrawlEventCollection, IgnoreList, IgnoreRules};
