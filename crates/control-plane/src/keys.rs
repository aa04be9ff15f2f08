//! Account SSH keys: add, generate and list.

use std::sync::Arc;

use node_runtime::{Error, Result, SshKey};
use tracing::info;
use uuid::Uuid;

use crate::credentials::generate_key_name;
use crate::ssh::{generate_ed25519, normalize_public_key};
use crate::store::{SshKeyRecord, Store, StoreError};

#[derive(Clone)]
pub struct SshKeyService {
    store: Arc<dyn Store>,
}

impl SshKeyService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Register an existing public key for the account.
    pub async fn add(
        &self,
        account_id: Uuid,
        name: Option<&str>,
        public_key: &str,
    ) -> Result<SshKey> {
        let canonical = normalize_public_key(public_key)
            .map_err(|e| Error::bad_request("Invalid SSH public key").with_source(e))?;
        let name = name
            .filter(|n| !n.is_empty())
            .map_or_else(generate_key_name, str::to_string);

        self.save(account_id, &name, &canonical).await.map(SshKey::from)
    }

    /// Create a new Ed25519 key pair. Only the public half is stored; the
    /// private key is returned exactly once.
    pub async fn generate(&self, account_id: Uuid, name: Option<&str>) -> Result<SshKey> {
        let name = name
            .filter(|n| !n.is_empty())
            .map_or_else(generate_key_name, str::to_string);
        let generated = generate_ed25519(&name)
            .map_err(|e| Error::internal("Failed to generate SSH key").with_source(e))?;

        let mut key = SshKey::from(self.save(account_id, &name, &generated.public_key).await?);
        key.private_key = Some(generated.private_key);
        Ok(key)
    }

    pub async fn list(&self, account_id: Uuid) -> Result<Vec<SshKey>> {
        let records = self
            .store
            .list_ssh_keys(account_id)
            .await
            .map_err(|e| Error::internal("Failed to list SSH keys").with_source(e))?;
        Ok(records.into_iter().map(SshKey::from).collect())
    }

    async fn save(
        &self,
        account_id: Uuid,
        name: &str,
        public_key: &str,
    ) -> Result<SshKeyRecord> {
        let record = self
            .store
            .add_ssh_key(account_id, name, public_key)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => Error::bad_request("SSH key already exists")
                    .with_suggestion("Use a different name or public key")
                    .with_source(e),
                StoreError::Backend(_) => Error::internal("Failed to save SSH key").with_source(e),
            })?;
        info!(account_id = %account_id, key = %record.name, "SSH key saved");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use node_runtime::ErrorKind;

    use super::*;
    use crate::store::MemoryStore;

    const KEY: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";

    fn service() -> SshKeyService {
        SshKeyService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_add_normalizes_and_names() {
        let keys = service();
        let account = Uuid::new_v4();
        let key = keys
            .add(account, None, &format!("{KEY} someone@host"))
            .await
            .unwrap();
        assert!(key.name.starts_with("uw:"));
        assert_eq!(key.public_key.as_deref(), Some(KEY));
        assert!(key.private_key.is_none());
    }

    #[tokio::test]
    async fn test_add_duplicate_is_bad_request() {
        let keys = service();
        let account = Uuid::new_v4();
        keys.add(account, Some("laptop"), KEY).await.unwrap();

        let err = keys.add(account, Some("desktop"), KEY).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_add_invalid_key() {
        let err = service()
            .add(Uuid::new_v4(), Some("x"), "ssh-ed25519 nope")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.message(), "Invalid SSH public key");
    }

    #[tokio::test]
    async fn test_generate_returns_private_key_once() {
        let keys = service();
        let account = Uuid::new_v4();
        let generated = keys.generate(account, Some("ci")).await.unwrap();
        assert_eq!(generated.name, "ci");
        assert!(generated.private_key.is_some());

        let listed = keys.list(account).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].public_key, generated.public_key);
        assert!(listed[0].private_key.is_none());
    }
}
