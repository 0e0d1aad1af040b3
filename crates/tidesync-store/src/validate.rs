//! Structural validation of identity records.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tidesync_core::{MappedObject, ObjectId, SyncPath};

/// A single violated invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum StructuralIssue {
    /// A record claims the sync root itself.
    RootPath { id: ObjectId },
    /// Several live records claim the same path.
    DuplicatePath { path: SyncPath, ids: Vec<ObjectId> },
    /// The path index disagrees with the records.
    IndexMismatch { path: SyncPath, id: ObjectId },
    /// A record's parent identity is missing or unknown.
    DanglingParent {
        id: ObjectId,
        parent: Option<ObjectId>,
    },
    /// A record's parent is a file.
    ParentNotFolder { id: ObjectId, parent: ObjectId },
    /// A record's parent lives somewhere other than the record's parent path.
    ParentPathMismatch {
        id: ObjectId,
        expected: SyncPath,
        actual: SyncPath,
    },
}

impl fmt::Display for StructuralIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootPath { id } => write!(f, "{id} is mapped to the sync root"),
            Self::DuplicatePath { path, ids } => {
                let ids: Vec<_> = ids.iter().map(ObjectId::as_str).collect();
                write!(f, "{path} is claimed by {}", ids.join(", "))
            }
            Self::IndexMismatch { path, id } => {
                write!(f, "path index maps {path} to {id} but the record disagrees")
            }
            Self::DanglingParent { id, parent: Some(parent) } => {
                write!(f, "{id} references unknown parent {parent}")
            }
            Self::DanglingParent { id, parent: None } => {
                write!(f, "{id} is nested but has no parent")
            }
            Self::ParentNotFolder { id, parent } => {
                write!(f, "{id} has file {parent} as parent")
            }
            Self::ParentPathMismatch {
                id,
                expected,
                actual,
            } => write!(f, "{id} expects its parent at {expected}, found {actual}"),
        }
    }
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StructuralReport {
    /// Number of records walked.
    pub records_checked: usize,
    /// Every violation found, in path order.
    pub issues: Vec<StructuralIssue>,
}

impl StructuralReport {
    /// Check if no invariant is violated.
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for StructuralReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} issue(s) in {} record(s)",
            self.issues.len(),
            self.records_checked
        )?;
        for issue in &self.issues {
            write!(f, "; {issue}")?;
        }
        Ok(())
    }
}

/// Walk all records and collect every violated invariant.
pub(crate) fn check(
    root_id: Option<&ObjectId>,
    records: &HashMap<ObjectId, MappedObject>,
    by_path: &HashMap<SyncPath, ObjectId>,
) -> StructuralReport {
    let mut sorted: Vec<&MappedObject> = records.values().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.id.cmp(&b.id)));

    let mut issues = Vec::new();

    let mut claims: HashMap<&SyncPath, Vec<&ObjectId>> = HashMap::new();
    for record in &sorted {
        claims.entry(&record.path).or_default().push(&record.id);
    }

    for record in &sorted {
        if record.path.is_root() {
            issues.push(StructuralIssue::RootPath {
                id: record.id.clone(),
            });
            continue;
        }

        let claimants = &claims[&record.path];
        if claimants.len() > 1 {
            if claimants[0] == &record.id {
                issues.push(StructuralIssue::DuplicatePath {
                    path: record.path.clone(),
                    ids: claimants.iter().map(|id| (*id).clone()).collect(),
                });
            }
        } else if by_path.get(&record.path) != Some(&record.id) {
            issues.push(StructuralIssue::IndexMismatch {
                path: record.path.clone(),
                id: record.id.clone(),
            });
        }

        if let Some(issue) = check_parent(root_id, records, record) {
            issues.push(issue);
        }
    }

    let mut stale: Vec<_> = by_path
        .iter()
        .filter(|(path, id)| records.get(*id).is_none_or(|r| &r.path != *path))
        .collect();
    stale.sort();
    for (path, id) in stale {
        issues.push(StructuralIssue::IndexMismatch {
            path: path.clone(),
            id: id.clone(),
        });
    }

    StructuralReport {
        records_checked: records.len(),
        issues,
    }
}

fn check_parent(
    root_id: Option<&ObjectId>,
    records: &HashMap<ObjectId, MappedObject>,
    record: &MappedObject,
) -> Option<StructuralIssue> {
    let expected = record.path.parent()?;

    if expected.is_root() {
        let parent = record.parent.as_ref()?;
        if Some(parent) == root_id {
            return None;
        }
        return match records.get(parent) {
            Some(found) => Some(StructuralIssue::ParentPathMismatch {
                id: record.id.clone(),
                expected,
                actual: found.path.clone(),
            }),
            // Without a known root identity a top-level parent cannot be checked.
            None if root_id.is_none() => None,
            None => Some(StructuralIssue::DanglingParent {
                id: record.id.clone(),
                parent: Some(parent.clone()),
            }),
        };
    }

    let Some(parent) = record.parent.as_ref() else {
        return Some(StructuralIssue::DanglingParent {
            id: record.id.clone(),
            parent: None,
        });
    };
    match records.get(parent) {
        None => Some(StructuralIssue::DanglingParent {
            id: record.id.clone(),
            parent: Some(parent.clone()),
        }),
        Some(found) if !found.kind.is_folder() => Some(StructuralIssue::ParentNotFolder {
            id: record.id.clone(),
            parent: parent.clone(),
        }),
        Some(found) if found.path != expected => Some(StructuralIssue::ParentPathMismatch {
            id: record.id.clone(),
            expected,
            actual: found.path.clone(),
        }),
        Some(_) => None,
    }
}
