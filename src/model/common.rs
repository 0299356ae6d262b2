use uuid::Uuid;

pub type Id = String;

/// Epoch seconds, the timestamp unit used by every stored record.
pub type Timestamp = i64;

/// Name of the branch every repository is created with.
pub const DEFAULT_BRANCH: &str = "main";

/// Counter key used for repository identifiers.
pub const REPO_ID_COUNTER: &str = "repoId";

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

pub fn now_timestamp() -> Timestamp {
    chrono::Utc::now().timestamp()
}
