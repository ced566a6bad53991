use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::core::error::Error;
use crate::types::identity::StandardIdentity;

/// Seam for the identity backend so storage can later move to a database
/// without touching the token controller or the guard.
pub(crate) trait CredentialRepository {
    async fn lookup(&self, username: &str) -> Option<StandardIdentity>;

    async fn verify(&self, identity: &StandardIdentity, password: &str) -> Result<bool, Error>;
}

/// Config-backed identity table. Password verification runs on the blocking
/// pool: the bcrypt comparison is expensive on purpose and must not stall
/// the request-handling runtime.
#[derive(Clone, Debug)]
pub(crate) struct StaticCredentialStore {
    users: Arc<HashMap<String, StandardIdentity>>,
}

impl StaticCredentialStore {
    pub(crate) fn new(users: HashMap<String, StandardIdentity>) -> Self {
        Self {
            users: Arc::new(users),
        }
    }
}

impl CredentialRepository for StaticCredentialStore {
    async fn lookup(&self, username: &str) -> Option<StandardIdentity> {
        self.users.get(username).cloned()
    }

    async fn verify(&self, identity: &StandardIdentity, password: &str) -> Result<bool, Error> {
        let password = password.to_string();
        let hash = identity.password_hash.clone();

        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|_| Error::Internal)?
            .map_err(Error::Bcrypt)
    }
}

pub(crate) trait RevocationStore {
    async fn add(&self, token: &str);

    async fn contains(&self, token: &str) -> bool;
}

/// Process-wide revocation set; append-only until restart.
#[derive(Clone, Debug, Default)]
pub(crate) struct InMemoryRevocationStore {
    revoked: Arc<RwLock<HashSet<String>>>,
}

impl RevocationStore for InMemoryRevocationStore {
    async fn add(&self, token: &str) {
        self.revoked.write().await.insert(token.to_string());
    }

    async fn contains(&self, token: &str) -> bool {
        self.revoked.read().await.contains(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(username: &str, password: &str, active: bool) -> StaticCredentialStore {
        // Low cost keeps the test fast; production hashes are cost 12.
        let password_hash = bcrypt::hash(password, 4).unwrap();

        let mut users = HashMap::new();
        users.insert(
            username.to_string(),
            StandardIdentity {
                username: username.to_string(),
                password_hash,
                active,
                scopes: vec!["read".to_string()],
                upstream: None,
            },
        );

        StaticCredentialStore::new(users)
    }

    #[tokio::test]
    async fn lookup_returns_known_users_only() {
        let store = store_with("admin", "admin123", true);

        assert!(store.lookup("admin").await.is_some());
        assert!(store.lookup("nobody").await.is_none());
    }

    #[tokio::test]
    async fn verify_accepts_the_right_password() {
        let store = store_with("admin", "admin123", true);
        let identity = store.lookup("admin").await.unwrap();

        assert!(store.verify(&identity, "admin123").await.unwrap());
        assert!(!store.verify(&identity, "wrong").await.unwrap());
    }

    #[tokio::test]
    async fn revocation_insert_is_idempotent() {
        let revocations = InMemoryRevocationStore::default();

        assert!(!revocations.contains("token").await);

        revocations.add("token").await;
        revocations.add("token").await;

        assert!(revocations.contains("token").await);
        assert!(!revocations.contains("other").await);
    }
}
