//! Reference-merge for the persisted model and the `last_commit_at` helper
//! used when updating the repository record after a successful push.

use crate::changes::Command;
use crate::model::{Reference, RootHash, Timestamp};
use crate::transaction::RootedStorer;
use std::collections::HashMap;

/// Applies a root's executed commands directly onto its transactional
/// storer. Commands arriving here are already bucketed by root, so unlike
/// [`update_repository_references`] there is no need to re-check `init`
/// against a mixed-root reference list.
pub fn apply_commands_to_storer(storer: &mut dyn RootedStorer, commands: &[Command]) {
    for command in commands {
        match command {
            Command::Create { new } | Command::Update { new, .. } => {
                storer.set_reference(new.clone())
            }
            Command::Delete { old } => storer.delete_reference(&old.name),
        }
    }
}

/// Applies the executed commands for one root onto the prior reference list,
/// returning the merged list (order not preserved — built from a `HashMap`).
pub fn update_repository_references(
    prior: &[Reference],
    commands: &[Command],
    root: RootHash,
) -> Vec<Reference> {
    let mut by_name: HashMap<String, Reference> =
        prior.iter().map(|r| (r.name.clone(), r.clone())).collect();

    for command in commands {
        match command {
            Command::Delete { old } => {
                if old.init != root {
                    // Command::root() invariant: Delete is bucketed under old.init.
                    continue;
                }
                if let Some(existing) = by_name.get(&old.name) {
                    if existing.init == old.init {
                        by_name.remove(&old.name);
                    }
                    // else: belongs to a different root, leave it.
                }
            }
            Command::Create { new } => {
                by_name.insert(new.name.clone(), new.clone());
            }
            Command::Update { old, new } => {
                match by_name.get(&new.name) {
                    Some(existing) if existing.init == old.init => {
                        by_name.insert(new.name.clone(), new.clone());
                    }
                    _ => {
                        // Stale view: a concurrent writer already moved this
                        // reference out from under `old`. Skip.
                    }
                }
            }
        }
    }

    by_name.into_values().collect()
}

/// The most recent commit time over `refs`; `None` iff `refs` is empty.
pub fn last_commit_at(refs: &[Reference]) -> Option<Timestamp> {
    refs.iter().map(|r| r.time).max()
}
