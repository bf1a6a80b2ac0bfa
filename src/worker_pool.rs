//! The WorkerPool adapter: a bounded `mpsc` queue plus a fixed set of
//! spawned tasks draining it. Not part of the core archiving logic — a thin
//! convenience for running several `Archiver::do_job` calls concurrently off
//! one shared job queue.

use crate::archiver::{Archiver, Notifiers};
use crate::clone::TemporaryCloner;
use crate::config::Config;
use crate::error::Error;
use crate::lock::LockService;
use crate::model::Job;
use crate::store::RepositoryStore;
use crate::transaction::RootedTransactioner;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Notifier hooks shared across every worker, delegated to (not
/// subclassed) by the per-worker [`Notifiers`] the pool builds.
#[derive(Default, Clone)]
pub struct NotifierHooks {
    pub start: Option<Arc<dyn Fn(&Job) + Send + Sync>>,
    pub stop: Option<Arc<dyn Fn(&Job, Option<&Error>) + Send + Sync>>,
    pub warn: Option<Arc<dyn Fn(&Job, &str) + Send + Sync>>,
}

fn notifiers_for_worker(hooks: &NotifierHooks, index: usize) -> Notifiers {
    let start = hooks.start.clone().map(|f| {
        Box::new(move |job: &Job| {
            log::debug!("[worker {index}] start: {}", job.repository_id);
            f(job);
        }) as Box<dyn Fn(&Job) + Send + Sync>
    });
    let stop = hooks.stop.clone().map(|f| {
        Box::new(move |job: &Job, err: Option<&Error>| {
            log::debug!("[worker {index}] stop: {}", job.repository_id);
            f(job, err);
        }) as Box<dyn Fn(&Job, Option<&Error>) + Send + Sync>
    });
    let warn = hooks.warn.clone().map(|f| {
        Box::new(move |job: &Job, message: &str| {
            log::debug!("[worker {index}] {message}");
            f(job, message);
        }) as Box<dyn Fn(&Job, &str) + Send + Sync>
    });
    Notifiers { start, stop, warn }
}

/// Owns the job queue and the spawned worker tasks draining it. Dropping the
/// pool closes the queue; in-flight jobs are allowed to finish, workers exit
/// once `recv()` observes the channel has closed.
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        config: &Config,
        store: Arc<dyn RepositoryStore>,
        transactioner: Arc<dyn RootedTransactioner>,
        cloner: Arc<dyn TemporaryCloner>,
        lock_service: Arc<dyn LockService>,
        hooks: NotifierHooks,
    ) -> WorkerPool {
        let worker_count = config.worker_count.max(1);
        let (sender, receiver) = mpsc::channel(worker_count * 4);
        let receiver = Arc::new(Mutex::new(receiver));
        let ttl = config.lock_ttl();

        let workers = (0..worker_count)
            .map(|index| {
                let receiver = receiver.clone();
                let store = store.clone();
                let transactioner = transactioner.clone();
                let cloner = cloner.clone();
                let lock_service = lock_service.clone();
                let hooks = hooks.clone();
                tokio::spawn(async move {
                    worker_loop(
                        index,
                        receiver,
                        store,
                        transactioner,
                        cloner,
                        lock_service,
                        hooks,
                        ttl,
                    )
                    .await
                })
            })
            .collect();

        WorkerPool { sender, workers }
    }

    pub async fn submit(&self, job: Job) -> Result<(), mpsc::error::SendError<Job>> {
        self.sender.send(job).await
    }

    /// Closes the queue and waits for every worker to drain it.
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    index: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    store: Arc<dyn RepositoryStore>,
    transactioner: Arc<dyn RootedTransactioner>,
    cloner: Arc<dyn TemporaryCloner>,
    lock_service: Arc<dyn LockService>,
    hooks: NotifierHooks,
    ttl: std::time::Duration,
) {
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else {
            log::info!("[worker {index}] job queue closed, exiting");
            return;
        };

        let session = match lock_service.new_session(ttl).await {
            Ok(session) => session,
            Err(e) => {
                log::error!("[worker {index}] failed to open a lock session: {e}");
                continue;
            }
        };

        let archiver = Archiver::new(
            store.clone(),
            transactioner.clone(),
            cloner.clone(),
            Arc::from(session),
            notifiers_for_worker(&hooks, index),
        );

        if let Err(e) = archiver.do_job(job).await {
            log::error!("[worker {index}] job for {} failed: {e}", job.repository_id);
        }
    }
}
