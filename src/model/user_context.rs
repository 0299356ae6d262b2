use crate::model::Id;
use serde::{Deserialize, Serialize};

/// Identity of the caller, established by the external authentication layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Id,
}

impl UserContext {
    pub fn new(user_id: Id) -> Self {
        Self { user_id }
    }

    pub fn is(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}
