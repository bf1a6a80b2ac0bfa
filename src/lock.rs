//! The `LockSession`/`Locker` seam and an in-process default backed by an
//! async mutex over a name-to-lease map.

use crate::model::RootHash;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock for {0} is already held")]
    AlreadyHeld(String),
    #[error("lock for {0} is not held by this locker")]
    NotHeld(String),
}

/// Fires at most once, when the lease backing a held lock is lost. Modeled
/// as a `oneshot::Receiver` rather than a plain bool so callers can check it
/// non-blockingly with a plain `try_recv`.
pub type LostLockSignal = oneshot::Receiver<()>;

#[async_trait]
pub trait Locker: Send + Sync {
    async fn lock(&self) -> Result<LostLockSignal, LockError>;
    async fn unlock(&self) -> Result<(), LockError>;
}

pub trait LockSession: Send + Sync {
    fn new_locker(&self, name: RootHash) -> Box<dyn Locker>;
}

#[async_trait]
pub trait LockService: Send + Sync {
    async fn new_session(&self, ttl: Duration) -> Result<Box<dyn LockSession>, LockError>;
}

/// In-process lock session: a shared map from lock name to an optional
/// "lose the lease" sender, guarded by a `tokio::sync::Mutex`. Sufficient for
/// single-process deployments and tests; a distributed deployment swaps in a
/// networked implementation behind the same trait.
#[derive(Clone, Default)]
pub struct LocalLockSession {
    held: Arc<Mutex<HashMap<String, oneshot::Sender<()>>>>,
}

impl LocalLockSession {
    pub fn new(_ttl: Duration) -> Self {
        Self::default()
    }

    /// Test helper: force-expire a currently-held lease, firing its lost-lock
    /// signal without actually releasing the lock (models a lock service
    /// that lost track of this session mid-operation).
    pub async fn expire(&self, name: &str) {
        if let Some(sender) = self.held.lock().await.remove(name) {
            let _ = sender.send(());
        }
    }
}

impl LockSession for LocalLockSession {
    fn new_locker(&self, name: RootHash) -> Box<dyn Locker> {
        Box::new(LocalLocker {
            held: self.held.clone(),
            name: name.to_string(),
        })
    }
}

struct LocalLocker {
    held: Arc<Mutex<HashMap<String, oneshot::Sender<()>>>>,
    name: String,
}

#[async_trait]
impl Locker for LocalLocker {
    async fn lock(&self) -> Result<LostLockSignal, LockError> {
        let mut held = self.held.lock().await;
        if held.contains_key(&self.name) {
            return Err(LockError::AlreadyHeld(self.name.clone()));
        }
        let (tx, rx) = oneshot::channel();
        held.insert(self.name.clone(), tx);
        Ok(rx)
    }

    async fn unlock(&self) -> Result<(), LockError> {
        let mut held = self.held.lock().await;
        match held.remove(&self.name) {
            Some(_) => Ok(()),
            None => Err(LockError::NotHeld(self.name.clone())),
        }
    }
}

/// Trivial `LockService` factory wrapping [`LocalLockSession`].
#[derive(Default)]
pub struct LocalLockService;

#[async_trait]
impl LockService for LocalLockService {
    async fn new_session(&self, ttl: Duration) -> Result<Box<dyn LockSession>, LockError> {
        Ok(Box::new(LocalLockSession::new(ttl)))
    }
}
