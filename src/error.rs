//! The error taxonomy for the archiver: one variant per distinct failure
//! mode, each carrying a `#[source]` chain so callers can unwrap down to the
//! original cause instead of matching on a string.

use crate::model::RepositoryId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Close of the cloned repository handle failed; only surfaced if no
    /// earlier error is already being returned.
    #[error("failed to clean up the temporary repository directory")]
    CleanRepositoryDir(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The fetch from `endpoint` failed and isn't a benign condition.
    #[error("failed to clone from endpoint {endpoint}")]
    Clone {
        endpoint: String,
        #[source]
        source: crate::clone::CloneError,
    },

    /// Push, commit, or the post-push DB update failed for this root.
    #[error("failed to push to the rooted repository for root {root}")]
    PushToRootedRepository {
        root: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// At least one root failed during the per-root push loop; always the
    /// outermost error when a partial failure occurred.
    #[error("{n_failed} of {n_total} roots failed to archive: {failed_hashes}")]
    ArchivingRoots {
        n_failed: usize,
        n_total: usize,
        failed_hashes: String,
    },

    /// `select_endpoint` was called with an empty endpoint list.
    #[error("repository has no endpoints to clone from")]
    EndpointsEmpty,

    /// `RepositoryStore::find_one` found no record for this id.
    #[error("no repository found with id {0}")]
    RepositoryIDNotFound(RepositoryId),

    /// `new_changes` failed because one of the two referencers failed.
    #[error("failed to compute the change set")]
    Changes(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Ambient addition: a `Config` file could not be read or parsed.
    #[error("failed to load configuration from {path}")]
    Config {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
