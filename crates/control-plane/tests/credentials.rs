//! Credential resolution and provider registration tests.

mod common;

use std::sync::Arc;

use common::{FakeRuntime, RecordingStore, PUBLIC_KEY};
use control_plane::credentials::{register_credentials, CredentialResolver};
use control_plane::store::Store;
use node_runtime::{ErrorKind, SshKey};
use uuid::Uuid;

fn resolver(store: &Arc<RecordingStore>) -> CredentialResolver {
    CredentialResolver::new(Arc::clone(store) as Arc<dyn Store>)
}

// ============================================================================
// fetch_credentials
// ============================================================================

#[tokio::test]
async fn test_name_match_never_touches_public_key_lookup() {
    let store = Arc::new(RecordingStore::new());
    let account = Uuid::new_v4();
    store.add_ssh_key(account, "laptop", PUBLIC_KEY).await.unwrap();

    let key = resolver(&store)
        .fetch_credentials(account, Some("laptop"), Some("not even a key"))
        .await
        .unwrap();

    assert_eq!(key.name, "laptop");
    assert_eq!(key.public_key.as_deref(), Some(PUBLIC_KEY));
    assert!(key.created_at.is_some());
    assert_eq!(store.public_key_lookups(), 0);
}

#[tokio::test]
async fn test_public_key_match_returns_existing_record() {
    let store = Arc::new(RecordingStore::new());
    let account = Uuid::new_v4();
    store.add_ssh_key(account, "laptop", PUBLIC_KEY).await.unwrap();

    let key = resolver(&store)
        .fetch_credentials(account, Some("desktop"), Some(&format!("{PUBLIC_KEY} me@desk")))
        .await
        .unwrap();

    assert_eq!(key.name, "laptop");
    assert_eq!(store.public_key_lookups(), 1);
    assert_eq!(store.list_ssh_keys(account).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_public_key_is_saved_under_given_name() {
    let store = Arc::new(RecordingStore::new());
    let account = Uuid::new_v4();

    let key = resolver(&store)
        .fetch_credentials(account, Some("desktop"), Some(PUBLIC_KEY))
        .await
        .unwrap();

    assert_eq!(key.name, "desktop");
    let saved = store
        .get_ssh_key_by_name(account, "desktop")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.public_key, PUBLIC_KEY);
}

#[tokio::test]
async fn test_unknown_public_key_without_name_gets_generated_name() {
    let store = Arc::new(RecordingStore::new());
    let account = Uuid::new_v4();

    let key = resolver(&store)
        .fetch_credentials(account, Some(""), Some(PUBLIC_KEY))
        .await
        .unwrap();

    let phrase = key.name.strip_prefix("uw:").unwrap();
    assert_eq!(phrase.split('-').count(), 4);
}

#[tokio::test]
async fn test_keys_are_scoped_to_owner() {
    let store = Arc::new(RecordingStore::new());
    store
        .add_ssh_key(Uuid::new_v4(), "laptop", PUBLIC_KEY)
        .await
        .unwrap();

    let err = resolver(&store)
        .fetch_credentials(Uuid::new_v4(), Some("laptop"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_bad_requests() {
    let store = Arc::new(RecordingStore::new());
    let resolver = resolver(&store);
    let account = Uuid::new_v4();

    let neither = resolver.fetch_credentials(account, None, None).await.unwrap_err();
    assert_eq!(neither.kind(), ErrorKind::BadRequest);

    let empty = resolver
        .fetch_credentials(account, Some(""), Some(""))
        .await
        .unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::BadRequest);

    let missing = resolver
        .fetch_credentials(account, Some("nope"), None)
        .await
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::BadRequest);
    assert_eq!(missing.message(), "SSH key not found");

    let invalid = resolver
        .fetch_credentials(account, None, Some("ssh-ed25519 garbage"))
        .await
        .unwrap_err();
    assert_eq!(invalid.kind(), ErrorKind::BadRequest);
    assert_eq!(invalid.message(), "Invalid SSH public key");
}

// ============================================================================
// register_credentials
// ============================================================================

#[tokio::test]
async fn test_register_skips_existing_provider_key() {
    let runtime = FakeRuntime::new();
    runtime
        .state
        .provider_keys
        .lock()
        .unwrap()
        .push(SshKey::named("laptop"));

    register_credentials(&runtime, &SshKey::named("laptop").with_public_key(PUBLIC_KEY))
        .await
        .unwrap();
    assert_eq!(runtime.add_key_calls(), 0);
}

#[tokio::test]
async fn test_register_adds_missing_key_without_private_half() {
    let runtime = FakeRuntime::new();
    let mut key = SshKey::named("laptop").with_public_key(PUBLIC_KEY);
    key.private_key = Some("secret".into());

    register_credentials(&runtime, &key).await.unwrap();

    assert_eq!(runtime.add_key_calls(), 1);
    let registered = runtime.state.provider_keys.lock().unwrap().clone();
    assert_eq!(registered.len(), 1);
    assert!(registered[0].private_key.is_none());
}
