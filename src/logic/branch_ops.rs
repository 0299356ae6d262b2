use crate::error::{ProdhubError, ProdhubResult};
use crate::model::{validate_branch_name, Branch, Repository, Timestamp, DEFAULT_BRANCH};

/// Branch rules applied to a loaded repository aggregate. Lookups are
/// linear scans by name; repositories hold tens of branches, not thousands.
pub struct BranchOperations;

impl BranchOperations {
    pub fn get_branch<'a>(repo: &'a Repository, name: &str) -> ProdhubResult<&'a Branch> {
        repo.branches
            .iter()
            .find(|branch| branch.name == name)
            .ok_or_else(|| ProdhubError::BranchNotFound(name.to_string()))
    }

    pub fn has_branch(repo: &Repository, name: &str) -> bool {
        repo.branches.iter().any(|branch| branch.name == name)
    }

    /// Builds the new branch, forking a snapshot of `source_branch` when one
    /// is named, and appends it to the aggregate.
    pub fn create_branch(
        repo: &mut Repository,
        name: &str,
        source_branch: Option<&str>,
        now: Timestamp,
    ) -> ProdhubResult<Branch> {
        validate_branch_name(name)?;
        if Self::has_branch(repo, name) {
            return Err(ProdhubError::DuplicateBranchName(name.to_string()));
        }

        let branch = match source_branch.filter(|source| !source.is_empty()) {
            Some(source) => {
                let source = Self::get_branch(repo, source)?;
                Branch::new_from_branch(source, name.to_string(), now)
            }
            None => Branch::new(name.to_string(), now),
        };

        repo.branches.push(branch.clone());
        repo.updated_at = now;
        Ok(branch)
    }

    /// Checks that `name` may be deleted from the aggregate
    pub fn ensure_deletable(repo: &Repository, name: &str) -> ProdhubResult<()> {
        Self::ensure_not_protected(name)?;
        Self::get_branch(repo, name)?;
        Ok(())
    }

    pub fn ensure_not_protected(name: &str) -> ProdhubResult<()> {
        if name == DEFAULT_BRANCH {
            return Err(ProdhubError::ProtectedBranch(name.to_string()));
        }
        Ok(())
    }

    pub fn delete_branch(repo: &mut Repository, name: &str, now: Timestamp) -> ProdhubResult<Branch> {
        Self::ensure_deletable(repo, name)?;
        let index = repo
            .branches
            .iter()
            .position(|branch| branch.name == name)
            .ok_or_else(|| ProdhubError::BranchNotFound(name.to_string()))?;
        let removed = repo.branches.remove(index);
        repo.updated_at = now;
        Ok(removed)
    }
}
