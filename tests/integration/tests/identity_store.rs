//! Device identity persistence against the file-backed store.

use std::sync::Arc;

use gatelink_client::{
    verify_signature, DeviceTokenEntry, FileIdentityStore, IdentityManager, IdentityStore,
};
use gatelink_core::{id, SecretString};
use tempfile::TempDir;

#[tokio::test]
async fn test_identity_survives_restart() {
    let dir = TempDir::new().unwrap();

    let first = IdentityManager::new(Arc::new(FileIdentityStore::new(dir.path())))
        .get_or_create()
        .await
        .unwrap();
    let second = IdentityManager::new(Arc::new(FileIdentityStore::new(dir.path())))
        .get_or_create()
        .await
        .unwrap();

    assert_eq!(first.device_id(), second.device_id());
    assert_eq!(first.public_key(), second.public_key());

    let signature = second.sign("payload");
    assert!(verify_signature(first.public_key(), "payload", &signature));
}

#[tokio::test]
async fn test_corrupt_identity_is_replaced() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("device.json"), "{ definitely not json").unwrap();

    let store = Arc::new(FileIdentityStore::new(dir.path()));
    let identity = IdentityManager::new(store.clone()).get_or_create().await.unwrap();
    assert_eq!(identity.device_id().len(), 64);

    let stored = store.load_identity().await.unwrap().unwrap();
    assert_eq!(stored.device_id, identity.device_id());
}

#[tokio::test]
async fn test_stale_device_id_is_repaired() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileIdentityStore::new(dir.path()));
    let identity = IdentityManager::new(store.clone()).get_or_create().await.unwrap();

    let mut stored = store.load_identity().await.unwrap().unwrap();
    stored.device_id = "stale".to_string();
    store.save_identity(&stored).await.unwrap();

    let reloaded = IdentityManager::new(store.clone()).get_or_create().await.unwrap();
    assert_eq!(reloaded.device_id(), identity.device_id());
    assert_eq!(
        store.load_identity().await.unwrap().unwrap().device_id,
        identity.device_id()
    );
}

#[tokio::test]
async fn test_device_tokens_persist_per_role() {
    let dir = TempDir::new().unwrap();
    let store = FileIdentityStore::new(dir.path());
    let entry = DeviceTokenEntry {
        device_id: "dev-1".to_string(),
        role: "operator".to_string(),
        token: SecretString::new("dt"),
        scopes: vec!["operator.admin".to_string()],
        updated_at_ms: id::now_ms(),
    };
    store.save_device_token(&entry).await.unwrap();

    let reopened = FileIdentityStore::new(dir.path());
    let loaded = reopened.load_device_token("dev-1", "operator").await.unwrap().unwrap();
    assert_eq!(loaded.token.expose_secret(), "dt");
    assert!(reopened.load_device_token("dev-1", "viewer").await.unwrap().is_none());
    assert!(reopened.load_device_token("dev-2", "operator").await.unwrap().is_none());

    reopened.clear_device_token("dev-1", "operator").await.unwrap();
    assert!(store.load_device_token("dev-1", "operator").await.unwrap().is_none());
}
