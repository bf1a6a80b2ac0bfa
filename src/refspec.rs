//! Refspec translation: turns a [`Command`] into the git refspec that pushes
//! it into the namespaced, per-upstream slice of a rooted repository.

use crate::changes::Command;
use crate::model::RepositoryId;

/// `<name>/<repo_id>` partitions one rooted repository's reference space
/// across the many upstream repositories that share its root.
pub fn to_refspec(repo_id: RepositoryId, command: &Command) -> String {
    match command {
        Command::Create { new } | Command::Update { new, .. } => {
            format!("+{}:{}/{}", new.name, new.name, repo_id)
        }
        Command::Delete { old } => {
            format!(":{}/{}", old.name, repo_id)
        }
    }
}

pub fn to_refspecs(repo_id: RepositoryId, commands: &[Command]) -> Vec<String> {
    commands.iter().map(|c| to_refspec(repo_id, c)).collect()
}
