//! Find-or-create SSH credentials and mirror them into a provider's key store.

use std::sync::Arc;

use node_runtime::names::random_phrase;
use node_runtime::{Error, Result, ResultExt, Runtime, SshKey};
use tracing::{debug, info};
use uuid::Uuid;

use crate::ssh::normalize_public_key;
use crate::store::Store;

/// Random key name of the form `uw:<adjective>-<adjective>-<adjective>-<noun>`.
pub fn generate_key_name() -> String {
    format!("uw:{}", random_phrase(4, "-"))
}

/// Resolves the SSH key a request refers to against persistence.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn Store>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Look a key up by name, then by public key, creating it when only the
    /// public key is known.
    ///
    /// A name match wins outright and the public key is never inspected.
    /// Empty strings count as absent.
    pub async fn fetch_credentials(
        &self,
        account_id: Uuid,
        name: Option<&str>,
        public_key: Option<&str>,
    ) -> Result<SshKey> {
        let name = name.filter(|n| !n.is_empty());
        let public_key = public_key.filter(|k| !k.is_empty());

        if name.is_none() && public_key.is_none() {
            return Err(Error::bad_request(
                "Either Key name or Public Key must be provided",
            ));
        }

        if let Some(name) = name {
            let found = self
                .store
                .get_ssh_key_by_name(account_id, name)
                .await
                .map_err(|e| Error::internal("Failed to get SSH key").with_source(e))?;
            if let Some(record) = found {
                debug!(account_id = %account_id, key = %record.name, "Resolved SSH key by name");
                return Ok(record.into());
            }
        }

        let Some(public_key) = public_key else {
            return Err(Error::bad_request("SSH key not found")
                .with_suggestion("Provide a public key to register a new SSH key"));
        };
        let canonical = normalize_public_key(public_key)
            .map_err(|e| Error::bad_request("Invalid SSH public key").with_source(e))?;

        let found = self
            .store
            .get_ssh_key_by_public_key(account_id, &canonical)
            .await
            .map_err(|e| Error::internal("Failed to get SSH key").with_source(e))?;
        if let Some(record) = found {
            debug!(account_id = %account_id, key = %record.name, "Resolved SSH key by public key");
            return Ok(record.into());
        }

        let name = name.map_or_else(generate_key_name, str::to_string);
        let record = self
            .store
            .add_ssh_key(account_id, &name, &canonical)
            .await
            .map_err(|e| Error::internal("Failed to save SSH key").with_source(e))?;
        info!(account_id = %account_id, key = %record.name, "Saved new SSH key");
        Ok(record.into())
    }
}

/// Make sure `key` exists in the provider's key store.
///
/// Presence is decided by name only.
pub async fn register_credentials(runtime: &dyn Runtime, key: &SshKey) -> Result<()> {
    let provider_keys = runtime
        .list_ssh_keys()
        .await
        .context("failed to list ssh keys from provider")?;
    if provider_keys.iter().any(|k| k.name == key.name) {
        debug!(provider = %runtime.provider(), key = %key.name, "SSH key already registered");
        return Ok(());
    }

    runtime
        .add_ssh_key(key.without_private_key())
        .await
        .context("failed to add ssh key to provider")?;
    info!(provider = %runtime.provider(), key = %key.name, "Registered SSH key with provider");
    Ok(())
}
