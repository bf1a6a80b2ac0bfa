//! The Archiver: the orchestrator tying every seam together into one job's
//! worth of work. Exposes a single coarse-grained public operation
//! (`do_job`) that delegates root-by-root pushes to [`push_root`], keeping
//! the lock/transaction/push bookkeeping for one root isolated from the
//! others so a failure on one root can't corrupt the rest of the job.

use crate::changes::{diff_references, Changes, Command};
use crate::clone::{CloneError, TemporaryCloner, TemporaryRepository};
use crate::endpoint::select_endpoint;
use crate::error::Error;
use crate::lock::{LockSession, Locker};
use crate::merge::{apply_commands_to_storer, last_commit_at, update_repository_references};
use crate::model::{get_timestamp, Job, Repository, RepositoryField, Status};
use crate::refspec::to_refspecs;
use crate::store::RepositoryStore;
use crate::transaction::{RootedTransaction, RootedTransactioner};
use std::sync::Arc;

/// Optional hooks invoked in addition to, not instead of, logging.
#[derive(Default)]
pub struct Notifiers {
    pub start: Option<Box<dyn Fn(&Job) + Send + Sync>>,
    pub stop: Option<Box<dyn Fn(&Job, Option<&Error>) + Send + Sync>>,
    pub warn: Option<Box<dyn Fn(&Job, &str) + Send + Sync>>,
}

impl Notifiers {
    fn notify_start(&self, job: &Job) {
        log::info!("starting archive job for repository {}", job.repository_id);
        if let Some(start) = &self.start {
            start(job);
        }
    }

    fn notify_stop(&self, job: &Job, err: Option<&Error>) {
        match err {
            Some(e) => log::info!("archive job for {} finished with error: {e}", job.repository_id),
            None => log::info!("archive job for {} finished successfully", job.repository_id),
        }
        if let Some(stop) = &self.stop {
            stop(job, err);
        }
    }

    fn notify_warn(&self, job: &Job, message: &str) {
        log::warn!("{message}");
        if let Some(warn) = &self.warn {
            warn(job, message);
        }
    }
}

/// Ties the four external seams together into the per-job workflow. Cheap to
/// construct and safe to share across concurrent jobs — all per-job state
/// lives on `do_job`'s stack.
pub struct Archiver {
    store: Arc<dyn RepositoryStore>,
    transactioner: Arc<dyn RootedTransactioner>,
    cloner: Arc<dyn TemporaryCloner>,
    lock_session: Arc<dyn LockSession>,
    notifiers: Notifiers,
}

impl Archiver {
    pub fn new(
        store: Arc<dyn RepositoryStore>,
        transactioner: Arc<dyn RootedTransactioner>,
        cloner: Arc<dyn TemporaryCloner>,
        lock_session: Arc<dyn LockSession>,
        notifiers: Notifiers,
    ) -> Self {
        Archiver {
            store,
            transactioner,
            cloner,
            lock_session,
            notifiers,
        }
    }

    pub async fn do_job(&self, job: Job) -> Result<(), Error> {
        self.notifiers.notify_start(&job);
        let result = self.do_job_inner(&job).await;
        self.notifiers.notify_stop(&job, result.as_ref().err());
        result
    }

    async fn do_job_inner(&self, job: &Job) -> Result<(), Error> {
        let mut repo = self
            .store
            .find_one(job.repository_id)
            .await
            .map_err(|_| Error::RepositoryIDNotFound(job.repository_id))?
            .ok_or(Error::RepositoryIDNotFound(job.repository_id))?;

        let endpoint = select_endpoint(&repo.endpoints)?;

        let status_before_clone = repo.status;
        repo.status = Status::Fetching;
        let job_id = ulid::Ulid::new();
        let clone = match self.cloner.clone_repository(job_id, &endpoint).await {
            Ok(clone) => clone,
            Err(e) => {
                return self
                    .handle_clone_error(&mut repo, status_before_clone, &endpoint, e)
                    .await
            }
        };

        let body_result = self.do_job_with_clone(job, &mut repo, clone.as_ref()).await;

        match clone.close().await {
            Ok(()) => body_result,
            Err(e) if body_result.is_ok() => Err(Error::CleanRepositoryDir(Box::new(e))),
            Err(_) => body_result,
        }
    }

    /// Step 4's error-handling table.
    async fn handle_clone_error(
        &self,
        repo: &mut Repository,
        status_before_clone: Status,
        endpoint: &url::Url,
        error: CloneError,
    ) -> Result<(), Error> {
        let now = get_timestamp();
        repo.updated_at = now;
        repo.status = status_before_clone;

        let outcome = match &error {
            CloneError::EmptyUploadPackRequest => Ok(()),
            CloneError::RepositoryNotFound(_) => {
                repo.status = Status::NotFound;
                repo.fetch_error_at = Some(now);
                Ok(())
            }
            _ => {
                repo.fetch_error_at = Some(now);
                Err(Error::Clone {
                    endpoint: endpoint.to_string(),
                    source: error,
                })
            }
        };

        self.db_update_failed_repository(repo).await?;
        outcome
    }

    async fn do_job_with_clone(
        &self,
        job: &Job,
        repo: &mut Repository,
        clone: &dyn TemporaryRepository,
    ) -> Result<(), Error> {
        let old_refs = repo.references.clone();
        let new_refs = clone
            .references()
            .await
            .map_err(|e| Error::Changes(Box::new(e)))?;
        let changes: Changes = diff_references(&old_refs, &new_refs);

        let n_total = changes.len();
        let mut failed_hashes = Vec::new();

        for (root, commands) in changes {
            if let Err(message) = self.push_root(repo, clone, root, &commands).await {
                self.notifiers.notify_warn(job, &message);
                failed_hashes.push(root.to_string());
            }
        }

        if !failed_hashes.is_empty() {
            return Err(Error::ArchivingRoots {
                n_failed: failed_hashes.len(),
                n_total,
                failed_hashes: failed_hashes.join(", "),
            });
        }
        Ok(())
    }

    /// The per-root push loop. Returns `Err(message)` (already meant for
    /// `notify_warn`) if this root failed; the caller records it and keeps
    /// processing the remaining roots.
    async fn push_root(
        &self,
        repo: &mut Repository,
        clone: &dyn TemporaryRepository,
        root: crate::model::RootHash,
        commands: &[Command],
    ) -> Result<(), String> {
        let locker = self.lock_session.new_locker(root);
        let mut lost_lock = match locker.lock().await {
            Ok(rx) => rx,
            Err(e) => return Err(format!("failed to lock root {root}: {e}")),
        };

        let released = self.run_push_root(repo, clone, root, commands).await;

        if lost_lock.try_recv().is_ok() {
            log::error!("lost the lock for root {root} after the push already committed");
        }

        if let Err(e) = locker.unlock().await {
            log::warn!("failed to release lock for root {root}: {e}");
        }

        released
    }

    async fn run_push_root(
        &self,
        repo: &mut Repository,
        clone: &dyn TemporaryRepository,
        root: crate::model::RootHash,
        commands: &[Command],
    ) -> Result<(), String> {
        let mut transaction = self
            .transactioner
            .begin(root)
            .await
            .map_err(|e| format!("failed to begin transaction for root {root}: {e}"))?;

        if let Err(e) = clone.store_config(repo).await {
            let _ = transaction.rollback().await;
            return Err(format!("failed to store push config for root {root}: {e}"));
        }

        match transaction.push_url() {
            Some(url) => {
                let refspecs = to_refspecs(repo.id, commands);
                if let Err(e) = clone.push(&url, &refspecs).await {
                    let _ = transaction.rollback().await;
                    let err = Error::PushToRootedRepository {
                        root: root.to_string(),
                        source: Box::new(e),
                    };
                    return Err(err.to_string());
                }
            }
            None => {
                apply_commands_to_storer(transaction.storer(), commands);
            }
        }

        if let Err(e) = transaction.commit().await {
            return Err(format!("failed to commit transaction for root {root}: {e}"));
        }

        repo.references = update_repository_references(&repo.references, commands, root);
        if let Err(e) = self.db_update_repository(repo).await {
            let err = Error::PushToRootedRepository {
                root: root.to_string(),
                source: Box::new(e),
            };
            return Err(err.to_string());
        }

        Ok(())
    }

    /// Persists the fields touched by a failed clone or push attempt.
    async fn db_update_failed_repository(&self, repo: &Repository) -> Result<(), Error> {
        self.store
            .update(
                repo,
                &[
                    RepositoryField::UpdatedAt,
                    RepositoryField::FetchErrorAt,
                    RepositoryField::References,
                    RepositoryField::Status,
                ],
            )
            .await
            .map_err(|e| Error::PushToRootedRepository {
                root: "(none)".to_string(),
                source: Box::new(e),
            })
    }

    /// Marks the repository fetched and persists the merged reference set.
    async fn db_update_repository(&self, repo: &mut Repository) -> Result<(), crate::store::StoreError> {
        let now = get_timestamp();
        repo.status = Status::Fetched;
        repo.fetched_at = Some(now);
        repo.last_commit_at = last_commit_at(&repo.references);
        repo.updated_at = now;
        self.store
            .update(
                repo,
                &[
                    RepositoryField::UpdatedAt,
                    RepositoryField::FetchedAt,
                    RepositoryField::LastCommitAt,
                    RepositoryField::Status,
                    RepositoryField::References,
                ],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone::CloneError;
    use crate::lock::LocalLockSession;
    use crate::model::{RepositoryId, RootHash};
    use crate::reference::synthetic_reference;
    use crate::store::InMemoryRepositoryStore;
    use crate::test_support::{sample_endpoint, ScriptedCloner, ScriptedTemporaryRepository};
    use crate::transaction::{InMemoryRootedTransactioner, RootedStorer, TransactionError};
    use std::sync::Mutex as StdMutex;

    fn root(byte: u8) -> RootHash {
        let mut h = [0u8; 20];
        h[0] = byte;
        RootHash(h)
    }
    fn hash(byte: u8) -> RootHash {
        let mut h = [0u8; 20];
        h[19] = byte;
        RootHash(h)
    }

    fn test_archiver(store: Arc<InMemoryRepositoryStore>, cloner: ScriptedCloner) -> Archiver {
        Archiver::new(
            store,
            Arc::new(InMemoryRootedTransactioner::new()),
            Arc::new(cloner),
            Arc::new(LocalLockSession::default()),
            Notifiers::default(),
        )
    }

    #[tokio::test]
    async fn fresh_repository_archives_every_reference() {
        let store = Arc::new(InMemoryRepositoryStore::new());
        let id = RepositoryId::new();
        store
            .insert(Repository::new(id, vec![sample_endpoint()]))
            .await;

        let r1 = root(1);
        let upstream_refs = vec![synthetic_reference("refs/heads/main", hash(1), r1)];
        let archiver = test_archiver(
            store.clone(),
            ScriptedCloner::succeeding_with(upstream_refs.clone()),
        );

        archiver.do_job(Job { repository_id: id }).await.unwrap();

        let record = store.get(id).await.unwrap();
        assert!(matches!(record.status, Status::Fetched));
        assert_eq!(record.references, upstream_refs);
        assert!(record.fetched_at.is_some());
    }

    #[tokio::test]
    async fn repository_id_not_found_fails_fast() {
        let store = Arc::new(InMemoryRepositoryStore::new());
        let archiver = test_archiver(store, ScriptedCloner::succeeding_with(vec![]));
        let err = archiver
            .do_job(Job {
                repository_id: RepositoryId::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RepositoryIDNotFound(_)));
    }

    #[tokio::test]
    async fn empty_upload_pack_is_a_benign_no_op() {
        let store = Arc::new(InMemoryRepositoryStore::new());
        let id = RepositoryId::new();
        store
            .insert(Repository::new(id, vec![sample_endpoint()]))
            .await;
        let archiver = test_archiver(
            store.clone(),
            ScriptedCloner::failing_with(CloneError::EmptyUploadPackRequest),
        );

        archiver.do_job(Job { repository_id: id }).await.unwrap();

        let record = store.get(id).await.unwrap();
        assert!(matches!(record.status, Status::Pending));
        assert!(record.fetch_error_at.is_none());
    }

    #[tokio::test]
    async fn repository_not_found_marks_status_and_succeeds() {
        let store = Arc::new(InMemoryRepositoryStore::new());
        let id = RepositoryId::new();
        store
            .insert(Repository::new(id, vec![sample_endpoint()]))
            .await;
        let archiver = test_archiver(
            store.clone(),
            ScriptedCloner::failing_with(CloneError::RepositoryNotFound(
                sample_endpoint().to_string(),
            )),
        );

        archiver.do_job(Job { repository_id: id }).await.unwrap();

        let record = store.get(id).await.unwrap();
        assert!(matches!(record.status, Status::NotFound));
        assert!(record.fetch_error_at.is_some());
    }

    #[tokio::test]
    async fn authentication_required_surfaces_as_clone_error() {
        let store = Arc::new(InMemoryRepositoryStore::new());
        let id = RepositoryId::new();
        store
            .insert(Repository::new(id, vec![sample_endpoint()]))
            .await;
        let archiver = test_archiver(
            store.clone(),
            ScriptedCloner::failing_with(CloneError::AuthenticationRequired(
                sample_endpoint().to_string(),
            )),
        );

        let err = archiver.do_job(Job { repository_id: id }).await.unwrap_err();
        assert!(matches!(err, Error::Clone { .. }));

        let record = store.get(id).await.unwrap();
        assert!(record.fetch_error_at.is_some());
        assert!(matches!(record.status, Status::Pending));
    }

    #[tokio::test]
    async fn root_migration_is_archived_under_the_new_root() {
        let store = Arc::new(InMemoryRepositoryStore::new());
        let id = RepositoryId::new();
        let r1 = root(1);
        let r2 = root(2);
        let mut repo = Repository::new(id, vec![sample_endpoint()]);
        repo.references = vec![synthetic_reference("refs/heads/x", hash(1), r1)];
        store.insert(repo).await;

        let migrated = synthetic_reference("refs/heads/x", hash(2), r2);
        let archiver = test_archiver(
            store.clone(),
            ScriptedCloner::succeeding_with(vec![migrated.clone()]),
        );

        archiver.do_job(Job { repository_id: id }).await.unwrap();

        let record = store.get(id).await.unwrap();
        assert_eq!(record.references, vec![migrated]);
    }

    /// Wraps an [`InMemoryRootedTransactioner`] transaction so it reports a
    /// push URL, forcing the Archiver down the real `clone.push(url, ..)`
    /// path instead of the in-memory `apply_commands_to_storer` shortcut.
    struct WithPushUrl {
        inner: Box<dyn RootedTransaction>,
        url: String,
    }

    #[async_trait::async_trait]
    impl RootedTransaction for WithPushUrl {
        fn storer(&mut self) -> &mut dyn RootedStorer {
            self.inner.storer()
        }
        fn push_url(&self) -> Option<String> {
            Some(self.url.clone())
        }
        async fn commit(self: Box<Self>) -> Result<(), TransactionError> {
            self.inner.commit().await
        }
        async fn rollback(self: Box<Self>) -> Result<(), TransactionError> {
            self.inner.rollback().await
        }
    }

    struct UrlBackedTransactioner {
        inner: InMemoryRootedTransactioner,
    }

    #[async_trait::async_trait]
    impl RootedTransactioner for UrlBackedTransactioner {
        async fn begin(
            &self,
            root: RootHash,
        ) -> Result<Box<dyn RootedTransaction>, TransactionError> {
            let inner = self.inner.begin(root).await?;
            Ok(Box::new(WithPushUrl {
                inner,
                url: format!("inproc://{root}"),
            }))
        }
    }

    /// Single-use cloner handing out one pre-scripted `TemporaryRepository`.
    struct FixedRepositoryCloner {
        repo: StdMutex<Option<ScriptedTemporaryRepository>>,
    }

    #[async_trait::async_trait]
    impl TemporaryCloner for FixedRepositoryCloner {
        async fn clone_repository(
            &self,
            _job_id: ulid::Ulid,
            _url: &url::Url,
        ) -> Result<Box<dyn TemporaryRepository>, CloneError> {
            Ok(Box::new(
                self.repo.lock().unwrap().take().expect("single use fake"),
            ))
        }
    }

    #[tokio::test]
    async fn push_failure_on_the_real_push_path_rolls_back_and_is_not_merged_into_the_model() {
        let store = Arc::new(InMemoryRepositoryStore::new());
        let id = RepositoryId::new();
        store
            .insert(Repository::new(id, vec![sample_endpoint()]))
            .await;

        let r1 = root(1);
        let upstream_refs = vec![synthetic_reference("refs/heads/main", hash(1), r1)];
        let inner = InMemoryRootedTransactioner::new();
        let transactioner = UrlBackedTransactioner {
            inner: inner.clone(),
        };
        let failing_repo = ScriptedTemporaryRepository::new(upstream_refs)
            .fail_next_push(CloneError::AuthenticationRequired(
                sample_endpoint().to_string(),
            ));
        let cloner = FixedRepositoryCloner {
            repo: StdMutex::new(Some(failing_repo)),
        };

        let archiver = Archiver::new(
            store.clone(),
            Arc::new(transactioner),
            Arc::new(cloner),
            Arc::new(LocalLockSession::default()),
            Notifiers::default(),
        );

        let err = archiver
            .do_job(Job { repository_id: id })
            .await
            .unwrap_err();
        let Error::ArchivingRoots {
            n_failed, n_total, ..
        } = err
        else {
            panic!("expected a partial ArchivingRoots failure, got {err}");
        };
        assert_eq!(n_failed, 1);
        assert_eq!(n_total, 1);

        assert!(inner.snapshot(r1).await.is_empty());
        let record = store.get(id).await.unwrap();
        assert!(record.references.is_empty());
    }
}
