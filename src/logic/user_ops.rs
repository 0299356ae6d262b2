use std::sync::Arc;

use log::info;

use crate::error::{ProdhubError, ProdhubResult, StoreError};
use crate::logic::credentials::CredentialHasher;
use crate::model::{
    generate_id, now_timestamp, LoginRequest, NewUser, Repository, User, UserContext, UserUpdate,
};
use crate::store::traits::{MembershipLedger, RepositoryStore};

/// Maps a unique-constraint hit on the users table to the matching conflict
fn ledger_error(step: &'static str, user: &User, err: StoreError) -> ProdhubError {
    match err {
        StoreError::UniqueViolation { ref constraint } if constraint.contains("email") => {
            ProdhubError::DuplicateEmail(user.email.clone())
        }
        StoreError::UniqueViolation { ref constraint } if constraint.contains("username") => {
            ProdhubError::DuplicateUsername(user.username.clone())
        }
        other => ProdhubError::from_store(step, other),
    }
}

/// User records in the membership ledger
#[derive(Clone)]
pub struct UserOperations {
    ledger: Arc<dyn MembershipLedger>,
    repos: Arc<dyn RepositoryStore>,
    hasher: Arc<dyn CredentialHasher>,
}

impl UserOperations {
    pub fn new(
        ledger: Arc<dyn MembershipLedger>,
        repos: Arc<dyn RepositoryStore>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        Self {
            ledger,
            repos,
            hasher,
        }
    }

    pub async fn create_user(&self, input: NewUser) -> ProdhubResult<User> {
        input.validate()?;
        self.ensure_email_free(&input.email, None).await?;
        self.ensure_username_free(&input.username, None).await?;

        let now = now_timestamp();
        let user = User {
            user_id: generate_id(),
            email: input.email,
            username: input.username,
            password: self.hash_password(input.password).await?,
            repo_ids: Vec::new(),
            liked_repos: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.ledger
            .insert_user(&user)
            .await
            .map_err(|e| ledger_error("user insert", &user, e))?;

        info!("Created user {} ({})", user.user_id, user.username);
        Ok(user)
    }

    /// Checks credentials and returns the user; issuing a token is left to
    /// the authentication layer in front of this service
    pub async fn login(&self, request: LoginRequest) -> ProdhubResult<User> {
        let user = self
            .ledger
            .find_user_by_email(&request.email)
            .await
            .map_err(|e| ProdhubError::from_store("user lookup", e))?
            .ok_or(ProdhubError::InvalidCredentials)?;

        let hasher = self.hasher.clone();
        let stored = user.password.clone();
        let matched =
            tokio::task::spawn_blocking(move || hasher.verify(&request.password, &stored))
                .await
                .map_err(|e| ProdhubError::Persist {
                    step: "password check",
                    message: e.to_string(),
                })?;
        if !matched {
            return Err(ProdhubError::InvalidCredentials);
        }
        Ok(user)
    }

    pub async fn get_user(&self, user_id: &str) -> ProdhubResult<User> {
        self.ledger
            .get_user(user_id)
            .await
            .map_err(|e| ProdhubError::from_store("user lookup", e))?
            .ok_or_else(|| ProdhubError::UserNotFound(user_id.to_string()))
    }

    /// Users may only change their own record
    pub async fn update_user(
        &self,
        caller: &UserContext,
        user_id: &str,
        update: UserUpdate,
    ) -> ProdhubResult<User> {
        if !caller.is(user_id) {
            return Err(ProdhubError::Forbidden(format!(
                "cannot update user {}",
                user_id
            )));
        }
        update.validate()?;

        let mut user = self.get_user(user_id).await?;
        if let Some(email) = update.email {
            self.ensure_email_free(&email, Some(user_id)).await?;
            user.email = email;
        }
        if let Some(username) = update.username {
            self.ensure_username_free(&username, Some(user_id)).await?;
            user.username = username;
        }
        user.updated_at = now_timestamp();
        self.save(&user, "user update").await?;
        Ok(user)
    }

    /// Repositories listed in the user's ledger entry. IDs whose document
    /// no longer exists are skipped.
    pub async fn list_user_repositories(&self, user_id: &str) -> ProdhubResult<Vec<Repository>> {
        let user = self.get_user(user_id).await?;
        self.repos
            .list_repositories_by_ids(&user.repo_ids)
            .await
            .map_err(|e| ProdhubError::from_store("repository listing", e))
    }

    pub async fn like_repository(&self, user_id: &str, repo_id: &str) -> ProdhubResult<User> {
        let mut user = self.get_user(user_id).await?;
        self.repos
            .get_repository(repo_id)
            .await
            .map_err(|e| ProdhubError::from_store("repository lookup", e))?
            .ok_or_else(|| ProdhubError::RepositoryNotFound(repo_id.to_string()))?;

        if user.likes(repo_id) {
            return Err(ProdhubError::AlreadyLiked(repo_id.to_string()));
        }
        user.liked_repos.push(repo_id.to_string());
        user.updated_at = now_timestamp();
        self.save(&user, "like").await?;
        Ok(user)
    }

    pub async fn unlike_repository(&self, user_id: &str, repo_id: &str) -> ProdhubResult<User> {
        let mut user = self.get_user(user_id).await?;
        if !user.likes(repo_id) {
            return Err(ProdhubError::NotLiked(repo_id.to_string()));
        }
        user.liked_repos.retain(|id| id != repo_id);
        user.updated_at = now_timestamp();
        self.save(&user, "unlike").await?;
        Ok(user)
    }

    /// Hashing is CPU bound, so it runs off the async workers
    async fn hash_password(&self, password: String) -> ProdhubResult<String> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ProdhubError::Persist {
                step: "password hash",
                message: e.to_string(),
            })?
    }

    async fn save(&self, user: &User, step: &'static str) -> ProdhubResult<()> {
        let saved = self
            .ledger
            .save_user(user)
            .await
            .map_err(|e| ledger_error(step, user, e))?;
        if !saved {
            return Err(ProdhubError::UserNotFound(user.user_id.clone()));
        }
        Ok(())
    }

    async fn ensure_email_free(&self, email: &str, owner: Option<&str>) -> ProdhubResult<()> {
        let existing = self
            .ledger
            .find_user_by_email(email)
            .await
            .map_err(|e| ProdhubError::from_store("user lookup", e))?;
        match existing {
            Some(other) if Some(other.user_id.as_str()) != owner => {
                Err(ProdhubError::DuplicateEmail(email.to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn ensure_username_free(&self, username: &str, owner: Option<&str>) -> ProdhubResult<()> {
        let existing = self
            .ledger
            .find_user_by_username(username)
            .await
            .map_err(|e| ProdhubError::from_store("user lookup", e))?;
        match existing {
            Some(other) if Some(other.user_id.as_str()) != owner => {
                Err(ProdhubError::DuplicateUsername(username.to_string()))
            }
            _ => Ok(()),
        }
    }
}
