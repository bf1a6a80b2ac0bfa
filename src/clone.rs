//! The `TemporaryCloner`/`TemporaryRepository` seam and a git2-backed
//! default implementation.

use crate::model::Repository;
use crate::reference::{Git2LiveReferencer, Reference, Referencer, ReferencerError};
use async_trait::async_trait;
use git2::Repository as Git2Repo;
use std::path::PathBuf;
use tempfile::TempDir;
use ulid::Ulid;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    /// The upstream has no history at all to offer ("git upload-pack"
    /// returned nothing) — treated as a benign no-op by the Archiver.
    #[error("upstream returned an empty upload-pack request")]
    EmptyUploadPackRequest,
    /// The upstream endpoint does not resolve to a repository.
    #[error("repository not found at {0}")]
    RepositoryNotFound(String),
    /// The upstream requires credentials this archiver does not have.
    #[error("authentication required for {0}")]
    AuthenticationRequired(String),
    /// Anything else (network failure, protocol error, ...).
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait TemporaryRepository: Send + Sync {
    async fn references(&self) -> Result<Vec<Reference>, ReferencerError>;
    async fn store_config(&self, repo: &Repository) -> Result<(), CloneError>;
    async fn push(&self, url: &str, refspecs: &[String]) -> Result<(), CloneError>;
    async fn close(self: Box<Self>) -> Result<(), CloneError>;
}

#[async_trait]
pub trait TemporaryCloner: Send + Sync {
    async fn clone_repository(
        &self,
        job_id: Ulid,
        url: &Url,
    ) -> Result<Box<dyn TemporaryRepository>, CloneError>;
}

/// Default `TemporaryCloner` backed directly by git2's clone/fetch/push
/// plumbing. Suitable for local and `file://` upstreams and for tests; a
/// production deployment that needs scratch-disk quotas, credential
/// plumbing, or object-storage-backed clones is expected to implement
/// [`TemporaryCloner`] itself.
pub struct Git2TemporaryCloner {
    pub scratch_root: PathBuf,
}

impl Git2TemporaryCloner {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Git2TemporaryCloner {
            scratch_root: scratch_root.into(),
        }
    }
}

#[async_trait]
impl TemporaryCloner for Git2TemporaryCloner {
    async fn clone_repository(
        &self,
        job_id: Ulid,
        url: &Url,
    ) -> Result<Box<dyn TemporaryRepository>, CloneError> {
        let url = url.clone();
        let scratch_root = self.scratch_root.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&scratch_root)?;
            let dir = TempDir::new_in(&scratch_root)?;
            let dest = dir.path().join(job_id.to_string());
            match Git2Repo::clone(url.as_str(), &dest) {
                Ok(repo) => Ok(Box::new(Git2TemporaryRepository { _dir: dir, repo })
                    as Box<dyn TemporaryRepository>),
                Err(e) => Err(classify_clone_error(e, url.as_str())),
            }
        })
        .await
        .expect("clone task panicked")
    }
}

fn classify_clone_error(e: git2::Error, url: &str) -> CloneError {
    use git2::ErrorClass;
    match e.class() {
        ErrorClass::Http | ErrorClass::Net if e.message().contains("not found") => {
            CloneError::RepositoryNotFound(url.to_string())
        }
        ErrorClass::Ssh | ErrorClass::Http
            if e.message().to_lowercase().contains("auth") =>
        {
            CloneError::AuthenticationRequired(url.to_string())
        }
        _ if e.message().contains("empty") => CloneError::EmptyUploadPackRequest,
        _ => CloneError::Git(e),
    }
}

pub struct Git2TemporaryRepository {
    /// Keeps the scratch directory alive for the life of the clone.
    _dir: TempDir,
    repo: Git2Repo,
}

#[async_trait]
impl TemporaryRepository for Git2TemporaryRepository {
    async fn references(&self) -> Result<Vec<Reference>, ReferencerError> {
        Git2LiveReferencer::new(&self.repo).references().await
    }

    async fn store_config(&self, repo_model: &Repository) -> Result<(), CloneError> {
        let mut config = self.repo.config()?;
        config.set_str("archiver.repositoryId", &repo_model.id.to_string())?;
        Ok(())
    }

    async fn push(&self, url: &str, refspecs: &[String]) -> Result<(), CloneError> {
        let mut remote = self
            .repo
            .remote_anonymous(url)
            .map_err(CloneError::from)?;
        let spec_refs: Vec<&str> = refspecs.iter().map(String::as_str).collect();
        remote.push(&spec_refs, None).map_err(CloneError::from)
    }

    async fn close(self: Box<Self>) -> Result<(), CloneError> {
        // The `TempDir` guard drops here, removing the scratch checkout.
        Ok(())
    }
}
