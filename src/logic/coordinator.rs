use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::error::{ProdhubError, ProdhubResult};
use crate::logic::artifacts::{ArtifactResolver, ArtifactSource};
use crate::logic::ids::IdGenerator;
use crate::logic::saga::Saga;
use crate::model::{now_timestamp, AppendTarget, Id, NewRepository, Repository, Version};
use crate::store::traits::{MembershipLedger, RepositoryStore};

/// Result of a repository deletion. The document is gone whenever this is
/// returned; `partial` says the owner's ledger entry could not be updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteOutcome {
    pub repo_id: Id,
    pub ledger_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<String>,
}

/// Orders writes that span the content store and the membership ledger.
///
/// Content is always written before the ledger reference to it, so a failure
/// between the two leaves an orphaned document rather than a ledger entry
/// pointing at nothing.
#[derive(Clone)]
pub struct WriteCoordinator {
    repos: Arc<dyn RepositoryStore>,
    ledger: Arc<dyn MembershipLedger>,
    ids: IdGenerator,
    artifacts: ArtifactResolver,
}

impl WriteCoordinator {
    pub fn new(
        repos: Arc<dyn RepositoryStore>,
        ledger: Arc<dyn MembershipLedger>,
        ids: IdGenerator,
        artifacts: ArtifactResolver,
    ) -> Self {
        Self {
            repos,
            ledger,
            ids,
            artifacts,
        }
    }

    pub async fn create_repository(
        &self,
        owner_id: &str,
        input: NewRepository,
    ) -> ProdhubResult<Repository> {
        input.validate()?;
        let mut saga = Saga::begin("create repository", owner_id);

        self.ledger
            .get_user(owner_id)
            .await
            .map_err(|e| ProdhubError::from_store("owner lookup", e))?
            .ok_or_else(|| ProdhubError::OwnerNotFound(owner_id.to_string()))?;
        saga.step_done("owner lookup");

        let repo_id = self.ids.next_repository_id().await?;
        saga.set_subject(repo_id.clone());
        saga.step_done("id allocation");

        let repo = Repository::new(repo_id.clone(), owner_id.to_string(), input, now_timestamp());
        self.repos
            .insert_repository(&repo)
            .await
            .map_err(|e| ProdhubError::from_store("repository insert", e))?;
        {
            let repos = self.repos.clone();
            let repo_id = repo_id.clone();
            saga.step_done_with_compensation("repository insert", move || async move {
                repos.delete_repository(&repo_id).await.map(|_| ())
            });
        }

        if let Err(cause) = self.link_owner(owner_id, &repo_id).await {
            return Err(saga.abort(cause).await);
        }
        saga.step_done("ledger update");
        saga.finish();

        info!("Created repository {} for owner {}", repo_id, owner_id);
        Ok(repo)
    }

    /// Re-reads the owner so the append lands on the freshest row available
    async fn link_owner(&self, owner_id: &str, repo_id: &str) -> ProdhubResult<()> {
        let mut owner = self
            .ledger
            .get_user(owner_id)
            .await
            .map_err(|e| ProdhubError::from_store("ledger update", e))?
            .ok_or_else(|| ProdhubError::OwnerNotFound(owner_id.to_string()))?;

        owner.add_repo(repo_id);
        owner.updated_at = now_timestamp();
        let saved = self
            .ledger
            .save_user(&owner)
            .await
            .map_err(|e| ProdhubError::from_store("ledger update", e))?;
        if !saved {
            return Err(ProdhubError::OwnerNotFound(owner_id.to_string()));
        }
        Ok(())
    }

    /// Deletes the document, then unlinks it from its owner. A ledger
    /// failure after the document is gone degrades to a partial outcome
    /// instead of re-creating the document.
    pub async fn delete_repository(&self, repo_id: &str) -> ProdhubResult<DeleteOutcome> {
        debug!("[delete repository:{}] started", repo_id);
        let repo = self
            .repos
            .get_repository(repo_id)
            .await
            .map_err(|e| ProdhubError::from_store("repository lookup", e))?
            .ok_or_else(|| ProdhubError::RepositoryNotFound(repo_id.to_string()))?;

        let deleted = self
            .repos
            .delete_repository(repo_id)
            .await
            .map_err(|e| ProdhubError::from_store("repository delete", e))?;
        if !deleted {
            return Err(ProdhubError::RepositoryNotFound(repo_id.to_string()));
        }

        let outcome = match self.unlink_owner(&repo.owner_id, repo_id).await {
            Ok(()) => DeleteOutcome {
                repo_id: repo_id.to_string(),
                ledger_updated: true,
                partial: None,
            },
            Err(e) => {
                warn!(
                    "Repository {} deleted but owner {} still references it: {}",
                    repo_id, repo.owner_id, e
                );
                DeleteOutcome {
                    repo_id: repo_id.to_string(),
                    ledger_updated: false,
                    partial: Some(format!("ledger update failed: {}", e)),
                }
            }
        };

        info!("Deleted repository {}", repo_id);
        Ok(outcome)
    }

    async fn unlink_owner(&self, owner_id: &str, repo_id: &str) -> ProdhubResult<()> {
        let mut owner = self
            .ledger
            .get_user(owner_id)
            .await
            .map_err(|e| ProdhubError::from_store("ledger update", e))?
            .ok_or_else(|| ProdhubError::OwnerNotFound(owner_id.to_string()))?;

        if !owner.remove_repo(repo_id) {
            return Ok(());
        }
        owner.updated_at = now_timestamp();
        let saved = self
            .ledger
            .save_user(&owner)
            .await
            .map_err(|e| ProdhubError::from_store("ledger update", e))?;
        if !saved {
            return Err(ProdhubError::OwnerNotFound(owner_id.to_string()));
        }
        Ok(())
    }

    /// Appends a version to the repository's flat list or to a branch. An
    /// artifact uploaded before a failed append stays in object storage.
    pub async fn add_version(
        &self,
        repo_id: &str,
        target: AppendTarget,
        source: ArtifactSource,
        changes: String,
    ) -> ProdhubResult<Version> {
        let url = self.artifacts.resolve(source).await?;

        let now = now_timestamp();
        let mut version = Version::new(changes, now);
        ArtifactResolver::attach(&mut version, url);

        let appended = self
            .repos
            .push_version(repo_id, &target, &version, now)
            .await
            .map_err(|e| ProdhubError::from_store("version append", e))?;
        if !appended {
            return Err(self.missing_target(repo_id, &target).await);
        }

        info!(
            "Added version {} to repository {}{}",
            version.version_id,
            repo_id,
            target
                .branch_name()
                .map(|name| format!(" (branch {})", name))
                .unwrap_or_default()
        );
        Ok(version)
    }

    /// Tells apart a missing repository from a missing branch after an
    /// append matched nothing
    async fn missing_target(&self, repo_id: &str, target: &AppendTarget) -> ProdhubError {
        let Some(branch) = target.branch_name() else {
            return ProdhubError::RepositoryNotFound(repo_id.to_string());
        };
        match self.repos.get_repository(repo_id).await {
            Ok(Some(_)) => ProdhubError::BranchNotFound(branch.to_string()),
            Ok(None) => ProdhubError::RepositoryNotFound(repo_id.to_string()),
            Err(e) => ProdhubError::from_store("repository lookup", e),
        }
    }
}
