//! The ChangeSet Builder: a pure diff between two reference sets.

use crate::reference::{by_name, Referencer};
use crate::model::{Reference, RootHash};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create { new: Reference },
    Update { old: Reference, new: Reference },
    Delete { old: Reference },
}

impl Command {
    /// The root this command is bucketed under: `new.init` for Create/Update,
    /// `old.init` for Delete.
    pub fn root(&self) -> RootHash {
        match self {
            Command::Create { new } => new.init,
            Command::Update { new, .. } => new.init,
            Command::Delete { old } => old.init,
        }
    }
}

/// A mapping from root-commit hash to the ordered list of commands
/// applicable to that root.
pub type Changes = HashMap<RootHash, Vec<Command>>;

pub async fn new_changes(
    old: &dyn Referencer,
    new: &dyn Referencer,
) -> Result<Changes, crate::error::Error> {
    let old_refs = old
        .references()
        .await
        .map_err(|e| crate::error::Error::Changes(Box::new(e)))?;
    let new_refs = new
        .references()
        .await
        .map_err(|e| crate::error::Error::Changes(Box::new(e)))?;

    Ok(diff_references(&old_refs, &new_refs))
}

/// The pure diff, factored out of `new_changes` so it can be unit-tested
/// without a `Referencer` in the loop.
pub fn diff_references(old_refs: &[Reference], new_refs: &[Reference]) -> Changes {
    let old_by_name = by_name(old_refs);
    let new_by_name = by_name(new_refs);

    let mut names: Vec<&String> = old_by_name.keys().collect();
    for name in new_by_name.keys() {
        if !old_by_name.contains_key(name) {
            names.push(name);
        }
    }

    let mut changes: Changes = HashMap::new();
    for name in names {
        let old = old_by_name.get(name);
        let new = new_by_name.get(name);
        match (old, new) {
            (None, Some(new)) => {
                changes
                    .entry(new.init)
                    .or_default()
                    .push(Command::Create { new: new.clone() });
            }
            (Some(old), None) => {
                changes
                    .entry(old.init)
                    .or_default()
                    .push(Command::Delete { old: old.clone() });
            }
            (Some(old), Some(new)) if old.init == new.init => {
                if old.hash != new.hash {
                    changes.entry(new.init).or_default().push(Command::Update {
                        old: old.clone(),
                        new: new.clone(),
                    });
                }
                // else: identical content, emit nothing.
            }
            (Some(old), Some(new)) => {
                // Root migration: delete under the old root, create under the new one.
                changes
                    .entry(old.init)
                    .or_default()
                    .push(Command::Delete { old: old.clone() });
                changes
                    .entry(new.init)
                    .or_default()
                    .push(Command::Create { new: new.clone() });
            }
            (None, None) => unreachable!("name came from one of the two maps"),
        }
    }
    changes
}
