use crate::error::ProdhubError;
use crate::model::repository::require_non_empty;
use crate::model::{Id, Timestamp};
use serde::{Deserialize, Serialize};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Membership record. `repo_ids` is the source of truth for ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: Id,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(default)]
    pub repo_ids: Vec<Id>,
    #[serde(default)]
    pub liked_repos: Vec<Id>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn owns(&self, repo_id: &str) -> bool {
        self.repo_ids.iter().any(|id| id == repo_id)
    }

    pub fn likes(&self, repo_id: &str) -> bool {
        self.liked_repos.iter().any(|id| id == repo_id)
    }

    /// Records ownership; a no-op when the ID is already present
    pub fn add_repo(&mut self, repo_id: &str) {
        if !self.owns(repo_id) {
            self.repo_ids.push(repo_id.to_string());
        }
    }

    pub fn remove_repo(&mut self, repo_id: &str) -> bool {
        let before = self.repo_ids.len();
        self.repo_ids.retain(|id| id != repo_id);
        self.repo_ids.len() != before
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), ProdhubError> {
        require_non_empty("username", &self.username)?;
        validate_email(&self.email)?;
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ProdhubError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
}

impl UserUpdate {
    pub fn validate(&self) -> Result<(), ProdhubError> {
        if let Some(username) = &self.username {
            require_non_empty("username", username)?;
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn validate_email(email: &str) -> Result<(), ProdhubError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };
    if !valid {
        return Err(ProdhubError::Validation(format!(
            "'{}' is not a valid email address",
            email
        )));
    }
    Ok(())
}
