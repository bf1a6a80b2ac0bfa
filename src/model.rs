//! Persisted and in-flight data types: `Reference`, `Repository`, `Job`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::fmt;
use ulid::Ulid;
use url::Url;

/// The raw 20-byte git object id of a commit, hex-encoded for display and
/// serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RootHash(pub [u8; 20]);

impl RootHash {
    pub fn from_oid(oid: git2::Oid) -> Self {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(oid.as_bytes());
        RootHash(hash)
    }
}

impl fmt::Display for RootHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for RootHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for RootHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let hash = <[u8; 20]>::try_from(bytes.as_slice())
            .map_err(|_| serde::de::Error::custom("invalid root hash length"))?;
        Ok(RootHash(hash))
    }
}

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

pub fn get_timestamp() -> Timestamp {
    let now = std::time::SystemTime::now();
    let since_epoch = now
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is before the Unix epoch");
    since_epoch.as_millis() as Timestamp
}

/// A named pointer within a repository, annotated with the root commit(s)
/// reachable from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
    pub hash: RootHash,
    /// The canonical root commit chosen to shard this reference.
    pub init: RootHash,
    /// All root commits reachable by walking parents from `hash`.
    pub roots: BTreeSet<RootHash>,
    pub time: Timestamp,
}

impl Reference {
    /// Two references are "same identity" when their names match.
    pub fn same_identity(&self, other: &Reference) -> bool {
        self.name == other.name
    }

    /// Two references are "same content" when name, hash, and init all match.
    pub fn same_content(&self, other: &Reference) -> bool {
        self.name == other.name && self.hash == other.hash && self.init == other.init
    }
}

/// Picks the canonical root out of a non-empty set: byte-wise lexicographic
/// minimum over the raw 20-byte object id. A reference with multiple disjoint
/// roots needs one deterministic root to be sharded under, and the smallest
/// raw id gives a stable total order without favoring any particular root.
pub fn canonical_init(roots: &BTreeSet<RootHash>) -> RootHash {
    *roots
        .iter()
        .min_by(|a, b| a.0.cmp(&b.0).then(Ordering::Equal))
        .expect("a reference always has at least one root")
}

/// ULID identity of a persisted [`Repository`].
pub type RepositoryId = Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The record was created but has never been successfully cloned yet.
    Pending,
    /// A clone attempt is currently in flight (set by the Archiver right
    /// before calling `TemporaryCloner::clone`).
    Fetching,
    /// The upstream endpoint(s) do not currently resolve to a repository.
    NotFound,
    /// The most recent archive completed successfully.
    Fetched,
}

/// The persisted record of one upstream repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub endpoints: Vec<Url>,
    pub status: Status,
    pub fetched_at: Option<Timestamp>,
    pub fetch_error_at: Option<Timestamp>,
    pub last_commit_at: Option<Timestamp>,
    pub references: Vec<Reference>,
    pub updated_at: Timestamp,
}

impl Repository {
    pub fn new(id: RepositoryId, endpoints: Vec<Url>) -> Self {
        Repository {
            id,
            endpoints,
            status: Status::Pending,
            fetched_at: None,
            fetch_error_at: None,
            last_commit_at: None,
            references: Vec::new(),
            updated_at: get_timestamp(),
        }
    }
}

/// Which fields of a [`Repository`] a `RepositoryStore::update` call touches,
/// so a real SQL-backed store can build a minimal `UPDATE ... SET` statement
/// instead of overwriting every column on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryField {
    UpdatedAt,
    FetchedAt,
    FetchErrorAt,
    LastCommitAt,
    Status,
    References,
}

/// Input to the Archiver; immutable for the life of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub repository_id: RepositoryId,
}
