use crate::error::ProdhubError;
use crate::model::{generate_id, Id, Timestamp, DEFAULT_BRANCH};
use serde::{Deserialize, Serialize};

pub const MIN_BPM: i32 = 20;
pub const MAX_BPM: i32 = 300;
pub const MAX_REPO_NAME_LEN: usize = 100;
pub const MAX_BRANCH_NAME_LEN: usize = 50;

/// Musical metadata attached to a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    pub bpm: i32,
    pub scale: String,
    pub genre: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub version_id: Id,
    pub url: String,
    pub changes: String,
    pub created_at: Timestamp,
}

impl Version {
    /// A version with a fresh ID and no artifact attached yet
    pub fn new(changes: String, created_at: Timestamp) -> Self {
        Self {
            version_id: generate_id(),
            url: String::new(),
            changes,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub date: Timestamp,
    pub description: String,
}

impl Activity {
    pub fn new(description: impl Into<String>, date: Timestamp) -> Self {
        Self {
            date,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub branch_id: Id,
    pub name: String,
    #[serde(default)]
    pub versions: Vec<Version>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub is_default: bool,
}

impl Branch {
    pub fn new_main_branch(created_at: Timestamp) -> Self {
        Self {
            branch_id: generate_id(),
            name: DEFAULT_BRANCH.to_string(),
            versions: Vec::new(),
            activities: Vec::new(),
            created_at,
            is_default: true,
        }
    }

    pub fn new(name: String, created_at: Timestamp) -> Self {
        Self {
            branch_id: generate_id(),
            name,
            versions: Vec::new(),
            activities: Vec::new(),
            created_at,
            is_default: false,
        }
    }

    /// Snapshot fork: the new branch owns copies of the source's versions
    /// and activities as they are right now.
    pub fn new_from_branch(source: &Branch, name: String, created_at: Timestamp) -> Self {
        Self {
            branch_id: generate_id(),
            name,
            versions: source.versions.clone(),
            activities: source.activities.clone(),
            created_at,
            is_default: false,
        }
    }
}

/// The repository aggregate: metadata plus embedded branches, versions and
/// activity log, stored as one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub repo_id: Id,
    pub owner_id: Id,
    #[serde(default)]
    pub collaborators: Vec<Id>,
    pub name: String,
    pub description: Description,
    #[serde(default)]
    pub activity: Vec<Activity>,
    #[serde(default)]
    pub versions: Vec<Version>,
    #[serde(default)]
    pub branches: Vec<Branch>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub public: bool,
}

impl Repository {
    pub fn new(repo_id: Id, owner_id: Id, input: NewRepository, now: Timestamp) -> Self {
        Self {
            repo_id,
            owner_id,
            collaborators: Vec::new(),
            name: input.name,
            description: Description {
                bpm: input.bpm,
                scale: input.scale,
                genre: input.genre,
            },
            activity: vec![Activity::new("Repository created", now)],
            versions: Vec::new(),
            branches: vec![Branch::new_main_branch(now)],
            created_at: now,
            updated_at: now,
            public: input.public.unwrap_or(false),
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    pub fn is_collaborator(&self, user_id: &str) -> bool {
        self.collaborators.iter().any(|id| id == user_id)
    }

    /// Public repositories are readable by anyone; private ones only by
    /// the owner and collaborators.
    pub fn can_view(&self, user_id: &str) -> bool {
        self.public || self.is_owned_by(user_id) || self.is_collaborator(user_id)
    }
}

/// Input model for creating a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRepository {
    pub name: String,
    pub bpm: i32,
    pub scale: String,
    pub genre: String,
    #[serde(default)]
    pub public: Option<bool>,
}

impl NewRepository {
    pub fn validate(&self) -> Result<(), ProdhubError> {
        validate_repo_name(&self.name)?;
        validate_bpm(self.bpm)?;
        require_non_empty("scale", &self.scale)?;
        require_non_empty("genre", &self.genre)?;
        Ok(())
    }
}

/// Partial update of repository metadata; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryUpdate {
    pub name: Option<String>,
    pub bpm: Option<i32>,
    pub scale: Option<String>,
    pub genre: Option<String>,
    pub public: Option<bool>,
}

impl RepositoryUpdate {
    pub fn validate(&self) -> Result<(), ProdhubError> {
        if let Some(name) = &self.name {
            validate_repo_name(name)?;
        }
        if let Some(bpm) = self.bpm {
            validate_bpm(bpm)?;
        }
        if let Some(scale) = &self.scale {
            require_non_empty("scale", scale)?;
        }
        if let Some(genre) = &self.genre {
            require_non_empty("genre", genre)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.bpm.is_none()
            && self.scale.is_none()
            && self.genre.is_none()
            && self.public.is_none()
    }

    /// Applies the update to an in-memory aggregate
    pub fn apply(&self, repo: &mut Repository, now: Timestamp) {
        if let Some(name) = &self.name {
            repo.name = name.clone();
        }
        if let Some(bpm) = self.bpm {
            repo.description.bpm = bpm;
        }
        if let Some(scale) = &self.scale {
            repo.description.scale = scale.clone();
        }
        if let Some(genre) = &self.genre {
            repo.description.genre = genre.clone();
        }
        if let Some(public) = self.public {
            repo.public = public;
        }
        repo.updated_at = now;
    }
}

/// Where a version or activity is appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendTarget {
    /// The repository's flat (pre-branch) list
    Repository,
    Branch(String),
}

impl AppendTarget {
    pub fn branch_name(&self) -> Option<&str> {
        match self {
            AppendTarget::Repository => None,
            AppendTarget::Branch(name) => Some(name),
        }
    }
}

fn validate_repo_name(name: &str) -> Result<(), ProdhubError> {
    let len = name.chars().count();
    if len == 0 || len > MAX_REPO_NAME_LEN {
        return Err(ProdhubError::Validation(format!(
            "name must be between 1 and {} characters",
            MAX_REPO_NAME_LEN
        )));
    }
    Ok(())
}

fn validate_bpm(bpm: i32) -> Result<(), ProdhubError> {
    if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
        return Err(ProdhubError::Validation(format!(
            "bpm must be between {} and {}, got {}",
            MIN_BPM, MAX_BPM, bpm
        )));
    }
    Ok(())
}

pub fn validate_branch_name(name: &str) -> Result<(), ProdhubError> {
    let len = name.chars().count();
    if len == 0 || len > MAX_BRANCH_NAME_LEN {
        return Err(ProdhubError::Validation(format!(
            "branch name must be between 1 and {} characters",
            MAX_BRANCH_NAME_LEN
        )));
    }
    Ok(())
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), ProdhubError> {
    if value.trim().is_empty() {
        return Err(ProdhubError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beat() -> NewRepository {
        NewRepository {
            name: "Beat1".to_string(),
            bpm: 120,
            scale: "C".to_string(),
            genre: "Lo-fi".to_string(),
            public: None,
        }
    }

    #[test]
    fn test_new_repository_has_single_default_main_branch() {
        let repo = Repository::new("1".to_string(), "u1".to_string(), beat(), 1_700_000_000);

        assert_eq!(repo.branches.len(), 1);
        let main = &repo.branches[0];
        assert_eq!(main.name, DEFAULT_BRANCH);
        assert!(main.is_default);
        assert!(main.versions.is_empty());
        assert!(main.activities.is_empty());
        assert_eq!(repo.created_at, repo.updated_at);
        assert_eq!(repo.activity.len(), 1);
        assert_eq!(repo.activity[0].description, "Repository created");
        assert!(repo.collaborators.is_empty());
        assert!(!repo.public);
    }

    #[test]
    fn test_bpm_bounds_are_inclusive() {
        let mut input = beat();
        input.bpm = 20;
        assert!(input.validate().is_ok());
        input.bpm = 300;
        assert!(input.validate().is_ok());
        input.bpm = 19;
        assert!(matches!(input.validate(), Err(ProdhubError::Validation(_))));
        input.bpm = 301;
        assert!(matches!(input.validate(), Err(ProdhubError::Validation(_))));
    }

    #[test]
    fn test_empty_required_fields_are_rejected() {
        let mut input = beat();
        input.scale = "  ".to_string();
        assert!(input.validate().is_err());

        let mut input = beat();
        input.name = String::new();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_branch_name_length() {
        assert!(validate_branch_name("feature").is_ok());
        assert!(validate_branch_name("").is_err());
        assert!(validate_branch_name(&"x".repeat(50)).is_ok());
        assert!(validate_branch_name(&"x".repeat(51)).is_err());
    }

    #[test]
    fn test_document_uses_stored_field_names() {
        let repo = Repository::new("7".to_string(), "u1".to_string(), beat(), 10);
        let doc = serde_json::to_value(&repo).unwrap();

        assert_eq!(doc["repoId"], "7");
        assert_eq!(doc["ownerId"], "u1");
        assert_eq!(doc["description"]["bpm"], 120);
        assert_eq!(doc["branches"][0]["isDefault"], true);
        assert_eq!(doc["activity"][0]["date"], 10);
    }

    #[test]
    fn test_visibility_rules() {
        let mut repo = Repository::new("1".to_string(), "owner".to_string(), beat(), 0);
        assert!(repo.can_view("owner"));
        assert!(!repo.can_view("stranger"));

        repo.collaborators.push("friend".to_string());
        assert!(repo.is_collaborator("friend"));
        assert!(repo.can_view("friend"));

        repo.public = true;
        assert!(repo.can_view("stranger"));
    }

    #[test]
    fn test_update_applies_only_present_fields() {
        let mut repo = Repository::new("1".to_string(), "u".to_string(), beat(), 5);
        let update = RepositoryUpdate {
            bpm: Some(90),
            public: Some(true),
            ..Default::default()
        };
        update.apply(&mut repo, 9);

        assert_eq!(repo.name, "Beat1");
        assert_eq!(repo.description.bpm, 90);
        assert_eq!(repo.description.scale, "C");
        assert!(repo.public);
        assert_eq!(repo.updated_at, 9);
    }
}
