//! Dependency analysis for tidesync crawls.
//!
//! This crate decides how the raw events of one crawl are applied:
//!
//! - **SCC engine** - iterative Tarjan over any [`DirectedGraph`]
//! - **Cycle detection** - classify mergeable (delete, create) pairs as safe
//!   renames/moves or as cycles that must fall back to delete + create
//! - **Refinement** - merge the safe pairs and order every operation so no
//!   path is claimed before it is vacated
//!
//! ```rust
//! use tidesync_analyze::{refine, CycleDetector};
//! use tidesync_core::{
//!     CrawlEventCollection, ItemSnapshot, ObjectId, ObjectKind, Origin, SyncEvent, SyncPath,
//! };
//!
//! let mut events = CrawlEventCollection::new();
//! let removal = events.push(SyncEvent::deleted(
//!     Origin::Local,
//!     ObjectId::new("doc"),
//!     ItemSnapshot::new(SyncPath::new("draft.docx").unwrap(), ObjectKind::File),
//! ));
//! let creation = events.push(SyncEvent::created(
//!     Origin::Local,
//!     None,
//!     ItemSnapshot::new(SyncPath::new("final.docx").unwrap(), ObjectKind::File),
//! ));
//! events.add_mergeable(ObjectId::new("doc"), removal, creation).unwrap();
//!
//! let plan = CycleDetector::new().detect(&events);
//! assert_eq!(plan.safe().count(), 1);
//!
//! let refined = refine(&events, &plan);
//! assert_eq!(refined.len(), 1);
//! assert!(refined.items()[0].is_merged());
//! ```

mod cycles;
mod refine;
pub mod scc;

pub use cycles::{CycleDetector, CyclePlan, PairGroup, PairVerdict, PlannedPair};
pub use refine::{refine, ReconciledEvent, RefinedEventCollection};
pub use scc::{strongly_connected_components, AdjacencyGraph, Component, DirectedGraph};
