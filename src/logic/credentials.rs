use log::warn;

use crate::error::{ProdhubError, ProdhubResult};

/// Hashing seam for user passwords. The stored form is opaque to callers.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> ProdhubResult<String>;
    fn verify(&self, password: &str, stored: &str) -> bool;
}

/// bcrypt with a configurable work factor; salt and cost live in the
/// stored string
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl CredentialHasher for BcryptHasher {
    fn hash(&self, password: &str) -> ProdhubResult<String> {
        bcrypt::hash(password, self.cost).map_err(|e| ProdhubError::Persist {
            step: "password hash",
            message: e.to_string(),
        })
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        match bcrypt::verify(password, stored) {
            Ok(matched) => matched,
            Err(e) => {
                warn!("Stored password hash is unreadable: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> BcryptHasher {
        BcryptHasher::new(4)
    }

    #[test]
    fn test_hash_verifies_only_the_original_password() {
        let stored = hasher().hash("secret1").unwrap();

        assert!(!stored.contains("secret1"));
        assert!(stored.starts_with("$2"));
        assert!(hasher().verify("secret1", &stored));
        assert!(!hasher().verify("secret2", &stored));
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        assert_ne!(
            hasher().hash("secret1").unwrap(),
            hasher().hash("secret1").unwrap()
        );
    }

    #[test]
    fn test_cost_is_recorded_in_the_hash() {
        let stored = hasher().hash("secret1").unwrap();
        assert!(stored.starts_with("$2b$04$"));
        // A hasher configured with a different cost still verifies it
        assert!(BcryptHasher::new(5).verify("secret1", &stored));
    }

    #[test]
    fn test_malformed_stored_value_never_verifies() {
        assert!(!hasher().verify("secret1", "no-separator"));
        assert!(!hasher().verify("secret1", ""));
    }

    #[test]
    fn test_invalid_cost_is_reported() {
        let err = BcryptHasher::new(1).hash("secret1").unwrap_err();
        assert_eq!(err.code(), "PERSIST_ERROR");
    }
}
