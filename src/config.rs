//! Ambient configuration: a serde-derived struct loadable from a JSON file
//! on disk, carrying the tunables the core workflow needs but doesn't decide
//! for itself (lock TTL, push timeout, worker pool size).

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long a root lock lease lasts before it must be renewed by the
    /// lock service (default 10s).
    pub lock_ttl_ms: u64,
    /// Advisory timeout on the push phase; enforcement is the
    /// `TemporaryCloner` implementation's responsibility, not the core's.
    pub push_timeout_ms: Option<u64>,
    /// Number of worker tasks the [`crate::worker_pool::WorkerPool`] spawns.
    pub worker_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            lock_ttl_ms: 10_000,
            push_timeout_ms: None,
            worker_count: 4,
        }
    }
}

impl Config {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn push_timeout(&self) -> Option<Duration> {
        self.push_timeout_ms.map(Duration::from_millis)
    }

    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Config, Error> {
        let path = path.as_ref();
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| Error::Config {
                    path: path.display().to_string(),
                    source: Box::new(e),
                })?;
        serde_json::from_str(&contents).map_err(|e| Error::Config {
            path: path.display().to_string(),
            source: Box::new(e),
        })
    }
}
