//! Shared test fixtures: a `setup_test()` logging-init-once helper plus a
//! handful of scripted fakes for the external seams, reused by both the unit
//! tests next to each module and the integration suite.

use crate::clone::{CloneError, TemporaryCloner, TemporaryRepository};
use crate::model::Repository;
use crate::reference::{Reference, ReferencerError};
use async_trait::async_trait;
use std::sync::Mutex;
use url::Url;

/// Initializes `env_logger` at most once per test binary; safe to call from
/// every test since `Once` makes repeated calls a no-op.
pub fn setup_test() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// A `TemporaryRepository` whose `references()` and `push()` outcomes are
/// fixed at construction time, standing in for a real upstream/rooted-repo
/// round trip in tests.
pub struct ScriptedTemporaryRepository {
    references: Vec<Reference>,
    push_result: Mutex<Option<Result<(), CloneError>>>,
}

impl ScriptedTemporaryRepository {
    pub fn new(references: Vec<Reference>) -> Self {
        ScriptedTemporaryRepository {
            references,
            push_result: Mutex::new(None),
        }
    }

    /// The next (and only) `push()` call will return this result instead of
    /// the default `Ok(())`.
    pub fn fail_next_push(self, error: CloneError) -> Self {
        *self.push_result.lock().unwrap() = Some(Err(error));
        self
    }
}

#[async_trait]
impl TemporaryRepository for ScriptedTemporaryRepository {
    async fn references(&self) -> Result<Vec<Reference>, ReferencerError> {
        Ok(self.references.clone())
    }

    async fn store_config(&self, _repo: &Repository) -> Result<(), CloneError> {
        Ok(())
    }

    async fn push(&self, _url: &str, _refspecs: &[String]) -> Result<(), CloneError> {
        match self.push_result.lock().unwrap().take() {
            Some(result) => result,
            None => Ok(()),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), CloneError> {
        Ok(())
    }
}

/// A `TemporaryCloner` that always produces the same outcome (success with a
/// fixed reference list, or a fixed clone error) for every call. A test that
/// needs per-call variation constructs one `ScriptedCloner` per expected
/// call instead of reusing one across several `do_job` invocations.
pub struct ScriptedCloner {
    outcome: Mutex<Option<Result<Vec<Reference>, CloneError>>>,
}

impl ScriptedCloner {
    pub fn succeeding_with(references: Vec<Reference>) -> Self {
        ScriptedCloner {
            outcome: Mutex::new(Some(Ok(references))),
        }
    }

    pub fn failing_with(error: CloneError) -> Self {
        ScriptedCloner {
            outcome: Mutex::new(Some(Err(error))),
        }
    }
}

#[async_trait]
impl TemporaryCloner for ScriptedCloner {
    async fn clone_repository(
        &self,
        _job_id: ulid::Ulid,
        _url: &Url,
    ) -> Result<Box<dyn TemporaryRepository>, CloneError> {
        match self
            .outcome
            .lock()
            .unwrap()
            .take()
            .expect("ScriptedCloner is single-use: construct one per do_job call")
        {
            Ok(refs) => Ok(Box::new(ScriptedTemporaryRepository::new(refs))),
            Err(e) => Err(e),
        }
    }
}

pub fn sample_endpoint() -> Url {
    "https://example.com/upstream.git".parse().unwrap()
}
