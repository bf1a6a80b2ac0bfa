//! A content-addressed archiver for git repositories: clones each tracked
//! upstream, shards its references by root commit, and pushes the result
//! into a rooted repository store shared by every upstream with that same
//! root.
//!
//! The core workflow lives in [`archiver::Archiver::do_job`]; everything
//! else in this crate is either a pure building block it composes
//! ([`changes`], [`merge`], [`refspec`], [`endpoint`]) or an external seam
//! with a default in-memory or git2-backed implementation ([`clone`],
//! [`transaction`], [`lock`], [`store`]).

pub mod archiver;
pub mod changes;
pub mod clone;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod lock;
pub mod merge;
pub mod model;
pub mod reference;
pub mod refspec;
pub mod store;
pub mod test_support;
pub mod transaction;
pub mod worker_pool;

pub use archiver::{Archiver, Notifiers};
pub use changes::{new_changes, Changes, Command};
pub use error::Error;
pub use model::{Job, Reference, Repository, RepositoryField, RepositoryId, RootHash, Status};
pub use worker_pool::{NotifierHooks, WorkerPool};
