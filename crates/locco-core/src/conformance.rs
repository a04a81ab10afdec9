//! Contract checks every [`LockAdapter`] must pass
//!
//! Adapter crates call [`run_all`] (or single checks) from their tests.
//! The checks sleep in real time with TTLs of a few hundred milliseconds,
//! so stores with native expiry (seconds-resolution purges included) stay
//! correct as long as they compare expiry on every operation.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::adapter::LockAdapter;
use crate::token::generate_owner_token;

/// Unique key per check so runs against a shared store never collide
pub fn unique_key(check: &str) -> String {
    format!("locco:conformance:{}:{}", check, generate_owner_token())
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Run every check in sequence
pub async fn run_all(adapter: Arc<dyn LockAdapter>) {
    rejects_invalid_input(adapter.as_ref()).await;
    create_is_exclusive(adapter.as_ref()).await;
    create_after_expiry(adapter.as_ref()).await;
    release_requires_owner(adapter.as_ref()).await;
    release_frees_key(adapter.as_ref()).await;
    release_after_expiry_fails(adapter.as_ref()).await;
    extend_requires_owner(adapter.as_ref()).await;
    extend_resets_expiry(adapter.as_ref()).await;
    extend_after_expiry_fails(adapter.as_ref()).await;
    concurrent_create_has_one_winner(adapter).await;
}

pub async fn rejects_invalid_input(adapter: &dyn LockAdapter) {
    let key = unique_key("invalid");
    assert!(adapter.create_lock("", "owner", 1000).await.unwrap_err().is_validation());
    assert!(adapter.create_lock(&key, "", 1000).await.unwrap_err().is_validation());
    assert!(adapter.create_lock(&key, "owner", 0).await.unwrap_err().is_validation());
    assert!(adapter.release_lock("", "owner").await.unwrap_err().is_validation());
    assert!(adapter.release_lock(&key, "").await.unwrap_err().is_validation());
    assert!(adapter.extend_lock("", "owner", 1000).await.unwrap_err().is_validation());
    assert!(adapter.extend_lock(&key, "owner", 0).await.unwrap_err().is_validation());
    assert!(adapter.is_valid_lock("", "owner").await.unwrap_err().is_validation());
    assert!(adapter.is_valid_lock(&key, "").await.unwrap_err().is_validation());

    // Nothing was written by the rejected calls
    adapter.create_lock(&key, "owner", 1000).await.unwrap();
    adapter.release_lock(&key, "owner").await.unwrap();
}

pub async fn create_is_exclusive(adapter: &dyn LockAdapter) {
    let key = unique_key("exclusive");
    adapter.create_lock(&key, "owner-a", 5000).await.unwrap();

    let err = adapter.create_lock(&key, "owner-b", 5000).await.unwrap_err();
    assert!(err.is_create_failed(), "expected CreateFailed, got {:?}", err);
    assert!(adapter.is_valid_lock(&key, "owner-a").await.unwrap());
    assert!(!adapter.is_valid_lock(&key, "owner-b").await.unwrap());

    adapter.release_lock(&key, "owner-a").await.unwrap();
}

pub async fn create_after_expiry(adapter: &dyn LockAdapter) {
    let key = unique_key("expiry");
    adapter.create_lock(&key, "owner-a", 100).await.unwrap();
    sleep_ms(150).await;

    assert!(!adapter.is_valid_lock(&key, "owner-a").await.unwrap());
    adapter.create_lock(&key, "owner-b", 5000).await.unwrap();
    assert!(adapter.is_valid_lock(&key, "owner-b").await.unwrap());

    adapter.release_lock(&key, "owner-b").await.unwrap();
}

pub async fn release_requires_owner(adapter: &dyn LockAdapter) {
    let key = unique_key("release-owner");
    adapter.create_lock(&key, "owner-a", 5000).await.unwrap();

    let err = adapter.release_lock(&key, "owner-b").await.unwrap_err();
    assert!(err.is_release_failed(), "expected ReleaseFailed, got {:?}", err);
    assert!(adapter.is_valid_lock(&key, "owner-a").await.unwrap());

    adapter.release_lock(&key, "owner-a").await.unwrap();
}

pub async fn release_frees_key(adapter: &dyn LockAdapter) {
    let key = unique_key("release");
    adapter.create_lock(&key, "owner-a", 5000).await.unwrap();
    adapter.release_lock(&key, "owner-a").await.unwrap();

    assert!(!adapter.is_valid_lock(&key, "owner-a").await.unwrap());
    let err = adapter.release_lock(&key, "owner-a").await.unwrap_err();
    assert!(err.is_release_failed());

    adapter.create_lock(&key, "owner-b", 5000).await.unwrap();
    adapter.release_lock(&key, "owner-b").await.unwrap();
}

pub async fn release_after_expiry_fails(adapter: &dyn LockAdapter) {
    let key = unique_key("release-expired");
    adapter.create_lock(&key, "owner-a", 100).await.unwrap();
    sleep_ms(150).await;

    let err = adapter.release_lock(&key, "owner-a").await.unwrap_err();
    assert!(err.is_release_failed(), "expected ReleaseFailed, got {:?}", err);
}

pub async fn extend_requires_owner(adapter: &dyn LockAdapter) {
    let key = unique_key("extend-owner");
    adapter.create_lock(&key, "owner-a", 5000).await.unwrap();

    let err = adapter.extend_lock(&key, "owner-b", 5000).await.unwrap_err();
    assert!(err.is_extend_failed(), "expected ExtendFailed, got {:?}", err);
    assert!(adapter.is_valid_lock(&key, "owner-a").await.unwrap());
    assert!(!adapter.is_valid_lock(&key, "owner-b").await.unwrap());

    adapter.release_lock(&key, "owner-a").await.unwrap();
}

pub async fn extend_resets_expiry(adapter: &dyn LockAdapter) {
    let key = unique_key("extend");
    adapter.create_lock(&key, "owner-a", 200).await.unwrap();
    sleep_ms(100).await;
    adapter.extend_lock(&key, "owner-a", 600).await.unwrap();

    // Past the original expiry, within the extended one
    sleep_ms(250).await;
    assert!(adapter.is_valid_lock(&key, "owner-a").await.unwrap());
    let err = adapter.create_lock(&key, "owner-b", 5000).await.unwrap_err();
    assert!(err.is_create_failed());

    adapter.release_lock(&key, "owner-a").await.unwrap();
}

pub async fn extend_after_expiry_fails(adapter: &dyn LockAdapter) {
    let key = unique_key("extend-expired");
    adapter.create_lock(&key, "owner-a", 100).await.unwrap();
    sleep_ms(150).await;

    let err = adapter.extend_lock(&key, "owner-a", 1000).await.unwrap_err();
    assert!(err.is_extend_failed(), "expected ExtendFailed, got {:?}", err);
    assert!(!adapter.is_valid_lock(&key, "owner-a").await.unwrap());
}

pub async fn concurrent_create_has_one_winner(adapter: Arc<dyn LockAdapter>) {
    let key = unique_key("race");
    let attempts = (0..20).map(|i| {
        let adapter = adapter.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let owner = format!("owner-{}", i);
            adapter
                .create_lock(&key, &owner, 5000)
                .await
                .map(|()| owner)
        })
    });

    let mut winners = Vec::new();
    for outcome in join_all(attempts).await {
        match outcome.expect("create task panicked") {
            Ok(owner) => winners.push(owner),
            Err(err) => assert!(err.is_create_failed(), "unexpected error {:?}", err),
        }
    }

    assert_eq!(winners.len(), 1, "winners: {:?}", winners);
    adapter.release_lock(&key, &winners[0]).await.unwrap();
}
