//! The `Referencer` abstraction: two interchangeable views of a repository's
//! reference set, one live (via git2) and one over the persisted model. The
//! change-set builder operates on either without caring which is live.

use crate::model::{canonical_init, get_timestamp, Reference, RootHash};
use async_trait::async_trait;
use git2::{ObjectType, Repository};
use std::collections::{BTreeSet, HashMap};

#[async_trait]
pub trait Referencer: Send + Sync {
    async fn references(&self) -> Result<Vec<Reference>, ReferencerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReferencerError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}

/// Reads the `references` already stored on a persisted repository record,
/// as-is.
pub struct ModelReferencer<'a>(pub &'a [Reference]);

#[async_trait]
impl<'a> Referencer for ModelReferencer<'a> {
    async fn references(&self) -> Result<Vec<Reference>, ReferencerError> {
        Ok(self.0.to_vec())
    }
}

/// Enumerates the branches and tags of a live, locally-accessible git
/// repository (typically a scratch clone), resolving each to a commit and
/// walking its full ancestry to discover every reachable root.
pub struct Git2LiveReferencer<'a> {
    repo: &'a Repository,
}

impl<'a> Git2LiveReferencer<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Git2LiveReferencer { repo }
    }

    /// Walks every ancestor of `start`, returning the set of commits with no
    /// parents (root commits) and the max commit time seen along `start`
    /// itself (the reference's own `time`).
    fn walk_roots(&self, start: git2::Oid) -> Result<(BTreeSet<RootHash>, i64), ReferencerError> {
        let start_commit = self.repo.find_commit(start)?;
        let time = start_commit.time().seconds() * 1000;

        let mut roots = BTreeSet::new();
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![start];
        while let Some(oid) = stack.pop() {
            if !seen.insert(oid) {
                continue;
            }
            let commit = self.repo.find_commit(oid)?;
            if commit.parent_count() == 0 {
                roots.insert(RootHash::from_oid(oid));
            } else {
                for parent in commit.parent_ids() {
                    stack.push(parent);
                }
            }
        }
        Ok((roots, time))
    }
}

#[async_trait]
impl<'a> Referencer for Git2LiveReferencer<'a> {
    async fn references(&self) -> Result<Vec<Reference>, ReferencerError> {
        let mut out = Vec::new();

        for branch in self.repo.branches(Some(git2::BranchType::Local))? {
            let (branch, _) = branch?;
            let git_ref = branch.into_reference();
            let Some(name) = git_ref.name() else {
                log::warn!("skipping a branch reference with no utf-8 name");
                continue;
            };
            let name = name.to_string();
            let Some(target) = git_ref.target() else {
                log::warn!("skipping branch {name}: no direct target");
                continue;
            };
            self.push_reference(&mut out, name, target)?;
        }

        for tag_name in self.repo.tag_names(None)?.iter().flatten() {
            let full_name = format!("refs/tags/{tag_name}");
            let Ok(git_ref) = self.repo.find_reference(&full_name) else {
                continue;
            };
            let peeled = match git_ref.peel(ObjectType::Commit) {
                Ok(obj) => obj,
                Err(_) => {
                    log::warn!("skipping tag {full_name}: does not peel to a commit");
                    continue;
                }
            };
            self.push_reference(&mut out, full_name, peeled.id())?;
        }

        Ok(out)
    }
}

impl<'a> Git2LiveReferencer<'a> {
    fn push_reference(
        &self,
        out: &mut Vec<Reference>,
        name: String,
        target: git2::Oid,
    ) -> Result<(), ReferencerError> {
        let (roots, time) = self.walk_roots(target)?;
        let init = canonical_init(&roots);
        out.push(Reference {
            name,
            hash: RootHash::from_oid(target),
            init,
            roots,
            time,
        });
        Ok(())
    }
}

/// Builds a [`Reference`] directly, bypassing git2 entirely — used by
/// in-memory test fakes that model upstream state without a real repository
/// on disk.
pub fn synthetic_reference(name: &str, hash: RootHash, init: RootHash) -> Reference {
    let mut roots = BTreeSet::new();
    roots.insert(init);
    Reference {
        name: name.to_string(),
        hash,
        init,
        roots,
        time: get_timestamp(),
    }
}

/// Groups a flat reference list by name, last-write-wins (used by both the
/// live and model referencer callers that need name-keyed lookups).
pub fn by_name(refs: &[Reference]) -> HashMap<String, Reference> {
    refs.iter().map(|r| (r.name.clone(), r.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{RepositoryInitOptions, Signature};
    use tempfile::TempDir;

    fn init_repo(dir: &std::path::Path) -> Repository {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir, &opts).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "tester").unwrap();
        config.set_str("user.email", "tester@example.com").unwrap();
        repo
    }

    /// Commits the (always empty) index as a new commit. `update_ref: None`
    /// creates a commit object without moving any branch, which is how a
    /// second, disjoint root commit is produced.
    fn commit(
        repo: &Repository,
        message: &str,
        parents: &[&git2::Commit],
        update_ref: Option<&str>,
    ) -> git2::Oid {
        let sig = Signature::now("tester", "tester@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(update_ref, &sig, &sig, message, &tree, parents)
            .unwrap()
    }

    #[tokio::test]
    async fn live_referencer_finds_both_roots_of_a_merge_and_picks_the_lexicographic_tiebreak() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());

        let first_root = commit(&repo, "first root", &[], Some("HEAD"));
        let second_root = commit(&repo, "second root", &[], None);
        let first_commit = repo.find_commit(first_root).unwrap();
        let second_commit = repo.find_commit(second_root).unwrap();
        commit(
            &repo,
            "merge",
            &[&first_commit, &second_commit],
            Some("HEAD"),
        );

        let referencer = Git2LiveReferencer::new(&repo);
        let refs = referencer.references().await.unwrap();
        assert_eq!(refs.len(), 1);

        let reference = &refs[0];
        assert_eq!(reference.name, "refs/heads/main");
        assert_eq!(reference.roots.len(), 2);
        assert!(reference.roots.contains(&RootHash::from_oid(first_root)));
        assert!(reference.roots.contains(&RootHash::from_oid(second_root)));

        let expected_init = if first_root.as_bytes() < second_root.as_bytes() {
            RootHash::from_oid(first_root)
        } else {
            RootHash::from_oid(second_root)
        };
        assert_eq!(reference.init, expected_init);
    }

    #[tokio::test]
    async fn live_referencer_finds_a_single_root_for_a_linear_history() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());

        let root = commit(&repo, "root", &[], Some("HEAD"));
        let root_commit = repo.find_commit(root).unwrap();
        commit(&repo, "second", &[&root_commit], Some("HEAD"));

        let referencer = Git2LiveReferencer::new(&repo);
        let refs = referencer.references().await.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].roots.len(), 1);
        assert_eq!(refs[0].init, RootHash::from_oid(root));
    }
}
