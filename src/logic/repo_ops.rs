use std::sync::Arc;

use log::info;

use crate::error::{ProdhubError, ProdhubResult};
use crate::logic::branch_ops::BranchOperations;
use crate::model::repository::require_non_empty;
use crate::model::{now_timestamp, Activity, AppendTarget, Branch, Repository, RepositoryUpdate, Version};
use crate::store::traits::{BranchInsert, RepositoryStore};

/// Repository reads and the writes that touch only the content store
#[derive(Clone)]
pub struct RepositoryOperations {
    repos: Arc<dyn RepositoryStore>,
}

impl RepositoryOperations {
    pub fn new(repos: Arc<dyn RepositoryStore>) -> Self {
        Self { repos }
    }

    pub async fn get_repository(&self, repo_id: &str) -> ProdhubResult<Repository> {
        self.repos
            .get_repository(repo_id)
            .await
            .map_err(|e| ProdhubError::from_store("repository lookup", e))?
            .ok_or_else(|| ProdhubError::RepositoryNotFound(repo_id.to_string()))
    }

    pub async fn list_public_repositories(&self) -> ProdhubResult<Vec<Repository>> {
        self.repos
            .list_public_repositories()
            .await
            .map_err(|e| ProdhubError::from_store("repository listing", e))
    }

    pub async fn update_repository(
        &self,
        repo_id: &str,
        update: RepositoryUpdate,
    ) -> ProdhubResult<Repository> {
        update.validate()?;
        if update.is_empty() {
            return self.get_repository(repo_id).await;
        }

        let updated = self
            .repos
            .update_repository(repo_id, &update, now_timestamp())
            .await
            .map_err(|e| ProdhubError::from_store("repository update", e))?;
        if !updated {
            return Err(ProdhubError::RepositoryNotFound(repo_id.to_string()));
        }
        self.get_repository(repo_id).await
    }

    /// The flat version list. Private repositories only show it to their
    /// owner and collaborators.
    pub async fn list_versions(&self, repo_id: &str, viewer_id: &str) -> ProdhubResult<Vec<Version>> {
        let repo = self.get_repository(repo_id).await?;
        if !repo.can_view(viewer_id) {
            return Err(ProdhubError::Forbidden(format!(
                "repository {} is private",
                repo_id
            )));
        }
        Ok(repo.versions)
    }

    pub async fn append_activity(
        &self,
        repo_id: &str,
        target: AppendTarget,
        description: String,
    ) -> ProdhubResult<Activity> {
        require_non_empty("description", &description)?;
        let now = now_timestamp();
        let activity = Activity::new(description, now);

        let appended = self
            .repos
            .push_activity(repo_id, &target, &activity, now)
            .await
            .map_err(|e| ProdhubError::from_store("activity append", e))?;
        if !appended {
            return Err(match target.branch_name() {
                Some(name) => {
                    self.get_repository(repo_id).await?;
                    ProdhubError::BranchNotFound(name.to_string())
                }
                None => ProdhubError::RepositoryNotFound(repo_id.to_string()),
            });
        }
        Ok(activity)
    }

    /// Validates against the loaded aggregate, then inserts only if the
    /// name is still free at write time.
    pub async fn create_branch(
        &self,
        repo_id: &str,
        name: &str,
        source_branch: Option<&str>,
    ) -> ProdhubResult<Branch> {
        let mut repo = self.get_repository(repo_id).await?;
        let now = now_timestamp();
        let branch = BranchOperations::create_branch(&mut repo, name, source_branch, now)?;

        let outcome = self
            .repos
            .push_branch(repo_id, &branch, now)
            .await
            .map_err(|e| ProdhubError::from_store("branch insert", e))?;
        match outcome {
            BranchInsert::Inserted => {
                info!("Created branch '{}' in repository {}", name, repo_id);
                Ok(branch)
            }
            BranchInsert::NameTaken => Err(ProdhubError::DuplicateBranchName(name.to_string())),
            BranchInsert::RepositoryMissing => {
                Err(ProdhubError::RepositoryNotFound(repo_id.to_string()))
            }
        }
    }

    pub async fn get_branch(&self, repo_id: &str, name: &str) -> ProdhubResult<Branch> {
        let repo = self.get_repository(repo_id).await?;
        BranchOperations::get_branch(&repo, name).cloned()
    }

    /// Read-only: checking out a branch is the client's concern
    pub async fn switch_branch(&self, repo_id: &str, name: &str) -> ProdhubResult<Branch> {
        self.get_branch(repo_id, name).await
    }

    pub async fn delete_branch(&self, repo_id: &str, name: &str) -> ProdhubResult<()> {
        BranchOperations::ensure_not_protected(name)?;
        let mut repo = self.get_repository(repo_id).await?;
        let now = now_timestamp();
        BranchOperations::delete_branch(&mut repo, name, now)?;

        let removed = self
            .repos
            .pull_branch(repo_id, name, now)
            .await
            .map_err(|e| ProdhubError::from_store("branch delete", e))?;
        if !removed {
            return Err(ProdhubError::BranchNotFound(name.to_string()));
        }
        info!("Deleted branch '{}' from repository {}", name, repo_id);
        Ok(())
    }
}
