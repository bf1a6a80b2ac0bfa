//! The `RootedTransactioner` seam and an in-memory default built on a
//! checkpoint/revert pattern: each `begin` works against a private copy of
//! the root's reference map, and only `commit` publishes it back.

use crate::model::{Reference, RootHash};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A write view onto one rooted repository's reference namespace.
pub trait RootedStorer: Send + Sync {
    fn references(&self) -> Vec<Reference>;
    fn set_reference(&mut self, reference: Reference);
    fn delete_reference(&mut self, name: &str);
}

#[async_trait]
pub trait RootedTransaction: Send + Sync {
    fn storer(&mut self) -> &mut dyn RootedStorer;

    /// If this transaction is backed by a real git-accessible rooted
    /// repository, the in-process loopback URL the push machinery should
    /// target for the duration of the push. `None` for storage backends
    /// (like [`InMemoryRootedTransactioner`]) that have no real git remote to
    /// push into; the Archiver then applies commands to the storer directly
    /// instead of performing a wire-level push.
    fn push_url(&self) -> Option<String> {
        None
    }

    async fn commit(self: Box<Self>) -> Result<(), TransactionError>;
    async fn rollback(self: Box<Self>) -> Result<(), TransactionError>;
}

#[async_trait]
pub trait RootedTransactioner: Send + Sync {
    async fn begin(&self, root: RootHash) -> Result<Box<dyn RootedTransaction>, TransactionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("no rooted repository is provisioned for root {0}")]
    UnknownRoot(RootHash),
    #[error("transaction commit failed: {0}")]
    CommitFailed(String),
}

type RootDb = HashMap<String, Reference>;

/// In-memory `RootedTransactioner`: each root commit gets its own
/// `HashMap<String, Reference>` behind a `tokio::sync::Mutex`.
#[derive(Clone, Default)]
pub struct InMemoryRootedTransactioner {
    roots: Arc<Mutex<HashMap<RootHash, RootDb>>>,
    /// Test hook: roots in this set fail on the next commit.
    poisoned: Arc<Mutex<HashSet<RootHash>>>,
}

impl InMemoryRootedTransactioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/inspection helper: snapshot of a root's current references.
    pub async fn snapshot(&self, root: RootHash) -> Vec<Reference> {
        self.roots
            .lock()
            .await
            .get(&root)
            .map(|db| db.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Test helper: make the next transaction opened against `root` fail on
    /// commit, modeling a push/commit failure against a real rooted store.
    pub async fn poison(&self, root: RootHash) {
        self.poisoned.lock().await.insert(root);
    }
}

#[async_trait]
impl RootedTransactioner for InMemoryRootedTransactioner {
    async fn begin(&self, root: RootHash) -> Result<Box<dyn RootedTransaction>, TransactionError> {
        let working = self
            .roots
            .lock()
            .await
            .get(&root)
            .cloned()
            .unwrap_or_default();
        let fail_on_commit = self.poisoned.lock().await.contains(&root);
        Ok(Box::new(InMemoryTransaction {
            roots: self.roots.clone(),
            root,
            working,
            fail_on_commit,
        }))
    }
}

struct InMemoryTransaction {
    roots: Arc<Mutex<HashMap<RootHash, RootDb>>>,
    root: RootHash,
    working: RootDb,
    fail_on_commit: bool,
}

impl RootedStorer for InMemoryTransaction {
    fn references(&self) -> Vec<Reference> {
        self.working.values().cloned().collect()
    }

    fn set_reference(&mut self, reference: Reference) {
        self.working.insert(reference.name.clone(), reference);
    }

    fn delete_reference(&mut self, name: &str) {
        self.working.remove(name);
    }
}

#[async_trait]
impl RootedTransaction for InMemoryTransaction {
    fn storer(&mut self) -> &mut dyn RootedStorer {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), TransactionError> {
        if self.fail_on_commit {
            return Err(TransactionError::CommitFailed(
                "forced failure for testing".to_string(),
            ));
        }
        self.roots.lock().await.insert(self.root, self.working);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransactionError> {
        // `working` is simply dropped; the shared map was never touched.
        Ok(())
    }
}
