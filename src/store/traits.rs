use crate::error::{StorageError, StoreResult};
use crate::model::{Activity, AppendTarget, Branch, Id, Repository, RepositoryUpdate, Timestamp, User, Version};

/// Outcome of a conditional branch insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchInsert {
    Inserted,
    /// A branch with that name existed at write time
    NameTaken,
    RepositoryMissing,
}

/// Document store holding one aggregate per repository
#[async_trait::async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn insert_repository(&self, repo: &Repository) -> StoreResult<()>;
    async fn get_repository(&self, repo_id: &str) -> StoreResult<Option<Repository>>;
    /// Repositories whose IDs are in `repo_ids`; missing IDs are skipped
    async fn list_repositories_by_ids(&self, repo_ids: &[Id]) -> StoreResult<Vec<Repository>>;
    async fn list_public_repositories(&self) -> StoreResult<Vec<Repository>>;
    /// Returns false when no document matched
    async fn delete_repository(&self, repo_id: &str) -> StoreResult<bool>;
    /// Field-level set of metadata; also refreshes `updatedAt`
    async fn update_repository(
        &self,
        repo_id: &str,
        update: &RepositoryUpdate,
        now: Timestamp,
    ) -> StoreResult<bool>;
    /// Appends `branch` only if no branch with the same name exists at write time
    async fn push_branch(&self, repo_id: &str, branch: &Branch, now: Timestamp) -> StoreResult<BranchInsert>;
    /// Removes the named branch; never matches the default branch
    async fn pull_branch(&self, repo_id: &str, name: &str, now: Timestamp) -> StoreResult<bool>;
    /// Appends to the target's version list. False when nothing matched.
    async fn push_version(
        &self,
        repo_id: &str,
        target: &AppendTarget,
        version: &Version,
        now: Timestamp,
    ) -> StoreResult<bool>;
    async fn push_activity(
        &self,
        repo_id: &str,
        target: &AppendTarget,
        activity: &Activity,
        now: Timestamp,
    ) -> StoreResult<bool>;
}

/// Atomic named counters
#[async_trait::async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increments `key` (absent keys start at 0) and returns the new value
    async fn increment(&self, key: &str) -> StoreResult<i64>;
}

/// Relational record of users and the repositories they own and like.
/// Updates are plain read-modify-write; the last write wins.
#[async_trait::async_trait]
pub trait MembershipLedger: Send + Sync {
    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    /// Fails with `UniqueViolation` on a taken email or username
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    /// Overwrites the stored row. False when the user no longer exists.
    async fn save_user(&self, user: &User) -> StoreResult<bool>;
}

/// External object storage for uploaded artifacts
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under a globally unique key derived from
    /// `suggested_name` and returns its public URL
    async fn store(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<String, StorageError>;
}
