use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

use crate::error::{StoreError, StoreResult};
use crate::model::{
    Activity, AppendTarget, Branch, Id, Repository, RepositoryUpdate, Timestamp, User, Version,
    DEFAULT_BRANCH,
};
use crate::store::traits::{BranchInsert, CounterStore, MembershipLedger, RepositoryStore};

/// Store calls that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertRepository,
    GetRepository,
    DeleteRepository,
    UpdateRepository,
    PushBranch,
    PullBranch,
    PushVersion,
    PushActivity,
    Increment,
    GetUser,
    InsertUser,
    SaveUser,
}

/// Armed failures stay armed until cleared
#[derive(Debug, Default)]
struct FailSwitch {
    armed: Mutex<HashMap<FailPoint, StoreError>>,
}

impl FailSwitch {
    fn arm(&self, point: FailPoint, err: StoreError) {
        self.armed.lock().insert(point, err);
    }

    fn clear(&self, point: FailPoint) {
        self.armed.lock().remove(&point);
    }

    fn check(&self, point: FailPoint) -> StoreResult<()> {
        match self.armed.lock().get(&point) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn sorted(mut repos: Vec<Repository>) -> Vec<Repository> {
    repos.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.repo_id.cmp(&b.repo_id))
    });
    repos
}

/// In-process document store and counters
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    repos: RwLock<HashMap<Id, Repository>>,
    counters: Mutex<HashMap<String, i64>>,
    failures: FailSwitch,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, point: FailPoint, err: StoreError) {
        self.failures.arm(point, err);
    }

    pub fn recover(&self, point: FailPoint) {
        self.failures.clear(point);
    }

    pub fn repository_count(&self) -> usize {
        self.repos.read().len()
    }

    /// Mutates a stored aggregate in place. False when the repository is missing.
    fn with_repository<F>(&self, repo_id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut Repository) -> bool,
    {
        let mut repos = self.repos.write();
        match repos.get_mut(repo_id) {
            Some(repo) => mutate(repo),
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl RepositoryStore for MemoryContentStore {
    async fn insert_repository(&self, repo: &Repository) -> StoreResult<()> {
        self.failures.check(FailPoint::InsertRepository)?;
        let mut repos = self.repos.write();
        if repos.contains_key(&repo.repo_id) {
            return Err(StoreError::UniqueViolation {
                constraint: "repositories_pkey".to_string(),
            });
        }
        repos.insert(repo.repo_id.clone(), repo.clone());
        Ok(())
    }

    async fn get_repository(&self, repo_id: &str) -> StoreResult<Option<Repository>> {
        self.failures.check(FailPoint::GetRepository)?;
        Ok(self.repos.read().get(repo_id).cloned())
    }

    async fn list_repositories_by_ids(&self, repo_ids: &[Id]) -> StoreResult<Vec<Repository>> {
        self.failures.check(FailPoint::GetRepository)?;
        let repos = self.repos.read();
        let found = repo_ids
            .iter()
            .filter_map(|id| repos.get(id).cloned())
            .collect();
        Ok(sorted(found))
    }

    async fn list_public_repositories(&self) -> StoreResult<Vec<Repository>> {
        self.failures.check(FailPoint::GetRepository)?;
        let public = self
            .repos
            .read()
            .values()
            .filter(|repo| repo.public)
            .cloned()
            .collect();
        Ok(sorted(public))
    }

    async fn delete_repository(&self, repo_id: &str) -> StoreResult<bool> {
        self.failures.check(FailPoint::DeleteRepository)?;
        Ok(self.repos.write().remove(repo_id).is_some())
    }

    async fn update_repository(
        &self,
        repo_id: &str,
        update: &RepositoryUpdate,
        now: Timestamp,
    ) -> StoreResult<bool> {
        self.failures.check(FailPoint::UpdateRepository)?;
        Ok(self.with_repository(repo_id, |repo| {
            update.apply(repo, now);
            true
        }))
    }

    async fn push_branch(&self, repo_id: &str, branch: &Branch, now: Timestamp) -> StoreResult<BranchInsert> {
        self.failures.check(FailPoint::PushBranch)?;
        let mut repos = self.repos.write();
        let Some(repo) = repos.get_mut(repo_id) else {
            return Ok(BranchInsert::RepositoryMissing);
        };
        if repo.branches.iter().any(|b| b.name == branch.name) {
            return Ok(BranchInsert::NameTaken);
        }
        repo.branches.push(branch.clone());
        repo.updated_at = now;
        Ok(BranchInsert::Inserted)
    }

    async fn pull_branch(&self, repo_id: &str, name: &str, now: Timestamp) -> StoreResult<bool> {
        self.failures.check(FailPoint::PullBranch)?;
        if name == DEFAULT_BRANCH {
            return Ok(false);
        }
        Ok(self.with_repository(repo_id, |repo| {
            match repo.branches.iter().position(|b| b.name == name) {
                Some(index) => {
                    repo.branches.remove(index);
                    repo.updated_at = now;
                    true
                }
                None => false,
            }
        }))
    }

    async fn push_version(
        &self,
        repo_id: &str,
        target: &AppendTarget,
        version: &Version,
        now: Timestamp,
    ) -> StoreResult<bool> {
        self.failures.check(FailPoint::PushVersion)?;
        Ok(self.with_repository(repo_id, |repo| {
            let versions = match target {
                AppendTarget::Repository => &mut repo.versions,
                AppendTarget::Branch(name) => match repo.branches.iter_mut().find(|b| &b.name == name) {
                    Some(branch) => &mut branch.versions,
                    None => return false,
                },
            };
            versions.push(version.clone());
            repo.updated_at = now;
            true
        }))
    }

    async fn push_activity(
        &self,
        repo_id: &str,
        target: &AppendTarget,
        activity: &Activity,
        now: Timestamp,
    ) -> StoreResult<bool> {
        self.failures.check(FailPoint::PushActivity)?;
        Ok(self.with_repository(repo_id, |repo| {
            let activities = match target {
                AppendTarget::Repository => &mut repo.activity,
                AppendTarget::Branch(name) => match repo.branches.iter_mut().find(|b| &b.name == name) {
                    Some(branch) => &mut branch.activities,
                    None => return false,
                },
            };
            activities.push(activity.clone());
            repo.updated_at = now;
            true
        }))
    }
}

#[async_trait::async_trait]
impl CounterStore for MemoryContentStore {
    async fn increment(&self, key: &str) -> StoreResult<i64> {
        self.failures.check(FailPoint::Increment)?;
        let mut counters = self.counters.lock();
        let value = counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}

/// In-process membership ledger
#[derive(Debug, Default)]
pub struct MemoryLedger {
    users: RwLock<HashMap<Id, User>>,
    failures: FailSwitch,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, point: FailPoint, err: StoreError) {
        self.failures.arm(point, err);
    }

    pub fn recover(&self, point: FailPoint) {
        self.failures.clear(point);
    }
}

#[async_trait::async_trait]
impl MembershipLedger for MemoryLedger {
    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        self.failures.check(FailPoint::GetUser)?;
        Ok(self.users.read().get(user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.failures.check(FailPoint::GetUser)?;
        Ok(self
            .users
            .read()
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.failures.check(FailPoint::GetUser)?;
        Ok(self
            .users
            .read()
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.failures.check(FailPoint::InsertUser)?;
        let mut users = self.users.write();
        let constraint = if users.contains_key(&user.user_id) {
            Some("users_pkey")
        } else if users.values().any(|u| u.email == user.email) {
            Some("users_email_key")
        } else if users.values().any(|u| u.username == user.username) {
            Some("users_username_key")
        } else {
            None
        };
        if let Some(constraint) = constraint {
            return Err(StoreError::UniqueViolation {
                constraint: constraint.to_string(),
            });
        }
        users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn save_user(&self, user: &User) -> StoreResult<bool> {
        self.failures.check(FailPoint::SaveUser)?;
        let mut users = self.users.write();
        match users.get_mut(&user.user_id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewRepository;
    use std::sync::Arc;

    fn repo(id: &str) -> Repository {
        Repository::new(
            id.to_string(),
            "owner".to_string(),
            NewRepository {
                name: format!("Repo {}", id),
                bpm: 100,
                scale: "A minor".to_string(),
                genre: "House".to_string(),
                public: None,
            },
            1,
        )
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_distinct() {
        let store = Arc::new(MemoryContentStore::new());
        let mut handles = Vec::new();
        for _ in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.increment("repoId").await.unwrap() }));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap());
        }
        values.sort_unstable();
        values.dedup();

        assert_eq!(values.len(), 64);
        assert_eq!(values.last(), Some(&64));
        assert_eq!(store.increment("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_push_branch_rejects_taken_name_at_write_time() {
        let store = MemoryContentStore::new();
        store.insert_repository(&repo("1")).await.unwrap();

        let feature = Branch::new("feature".to_string(), 2);
        assert_eq!(store.push_branch("1", &feature, 2).await.unwrap(), BranchInsert::Inserted);
        assert_eq!(store.push_branch("1", &feature, 3).await.unwrap(), BranchInsert::NameTaken);
        assert_eq!(
            store.push_branch("missing", &feature, 3).await.unwrap(),
            BranchInsert::RepositoryMissing
        );
    }

    #[tokio::test]
    async fn test_pull_branch_never_removes_main() {
        let store = MemoryContentStore::new();
        store.insert_repository(&repo("1")).await.unwrap();

        assert!(!store.pull_branch("1", DEFAULT_BRANCH, 5).await.unwrap());
        let stored = store.get_repository("1").await.unwrap().unwrap();
        assert_eq!(stored.branches.len(), 1);
    }

    #[tokio::test]
    async fn test_armed_failure_persists_until_recovered() {
        let store = MemoryContentStore::new();
        store.fail(FailPoint::Increment, StoreError::Unavailable("down".to_string()));
        assert!(store.increment("k").await.is_err());
        assert!(store.increment("k").await.is_err());

        store.recover(FailPoint::Increment);
        assert_eq!(store.increment("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ledger_reports_unique_violations() {
        let ledger = MemoryLedger::new();
        let user = User {
            user_id: "u1".to_string(),
            email: "a@x.com".to_string(),
            username: "alice".to_string(),
            password: "h".to_string(),
            repo_ids: Vec::new(),
            liked_repos: Vec::new(),
            created_at: 1,
            updated_at: 1,
        };
        ledger.insert_user(&user).await.unwrap();

        let same_email = User {
            user_id: "u2".to_string(),
            username: "bob".to_string(),
            ..user.clone()
        };
        let err = ledger.insert_user(&same_email).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::UniqueViolation {
                constraint: "users_email_key".to_string()
            }
        );
    }
}
