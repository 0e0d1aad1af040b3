//! Core types for tidesync.
//!
//! This crate provides the fundamental data structures shared by every
//! other tidesync crate: object identities and sync-relative paths, the
//! persisted identity record, the crawl event model, sync-root
//! configuration and the local/remote path mapper.

mod collection;
mod config;
mod error;
mod event;
mod ignore;
mod mapper;
mod node;
mod object;
mod path;
mod status;

pub use collection::{CrawlEventCollection, EventId, MergeablePair};
pub use config::{AuthType, SyncRootConfig, SyncRootConfigBuilder};
pub use error::{CoreError, FailureClass};
pub use event::{Change, EventKind, ItemSnapshot, Origin, SyncEvent};
pub use ignore::{IgnoreList, IgnoreRules};
pub use mapper::PathMapper;
pub use node::{ContentHash, ObjectId, ObjectKind};
pub use object::MappedObject;
pub use path::SyncPath;
pub use status::ConnectionStatus;
