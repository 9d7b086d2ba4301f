use std::{sync::Arc, time::Duration};

use anyhow::Result;
use futures_util::future::join_all;
use notification_dispatcher::{
    idempotency::IdempotencyTracker,
    models::{
        channel::Channel,
        record::{ChannelOutcome, ChannelStatus, ProcessingStatus},
    },
    store::{KeyValueStore, MemoryStore},
};

use crate::support::{test_tracker, tracker_with_window};

/// Test: a message can be claimed exactly once
#[tokio::test]
async fn test_start_processing_claims_once() -> Result<()> {
    let (_, tracker) = test_tracker();

    let first = tracker
        .start_processing("m1", &[Channel::Email, Channel::Sms])
        .await?;
    let second = tracker.start_processing("m1", &[Channel::Email]).await?;

    assert!(first, "First claim should succeed");
    assert!(!second, "Second claim should lose");

    assert!(tracker.is_processing("m1").await?);
    assert!(!tracker.has_been_processed("m1").await?);

    Ok(())
}

/// Test: concurrent claim attempts for the same message id yield exactly one winner
#[tokio::test]
async fn test_concurrent_claims_have_single_winner() -> Result<()> {
    let (_, tracker) = test_tracker();

    let claims = (0..10).map(|_| {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move {
            tracker
                .start_processing("race", &[Channel::Push])
                .await
                .unwrap()
        })
    });

    let results: Vec<bool> = join_all(claims)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners = results.iter().filter(|&&won| won).count();
    assert_eq!(winners, 1, "Exactly one concurrent claim should win");

    Ok(())
}

/// Test: one channel failing never blocks or reverts another channel's success
#[tokio::test]
async fn test_partial_channel_independence() -> Result<()> {
    let (_, tracker) = test_tracker();

    tracker
        .start_processing("m2", &[Channel::Email, Channel::Sms])
        .await?;

    tracker
        .update_channel_status(
            "m2",
            Channel::Email,
            ChannelOutcome::Failed("smtp relay down".to_string()),
        )
        .await?;

    let record = tracker.processing_record("m2").await?.unwrap();
    assert_eq!(record.status, ProcessingStatus::Processing);

    tracker
        .update_channel_status("m2", Channel::Sms, ChannelOutcome::Completed)
        .await?;

    let record = tracker.processing_record("m2").await?.unwrap();
    assert_eq!(record.status, ProcessingStatus::Completed);

    let email = &record.channels[&Channel::Email];
    assert_eq!(email.status, ChannelStatus::Failed);
    assert_eq!(email.error.as_deref(), Some("smtp relay down"));

    let sms = &record.channels[&Channel::Sms];
    assert_eq!(sms.status, ChannelStatus::Completed);
    assert!(sms.completed_at.is_some());

    assert!(tracker.has_been_processed("m2").await?);

    Ok(())
}

/// Test: concurrent channel updates for the same message never lose a write
#[tokio::test]
async fn test_concurrent_channel_updates_are_both_recorded() -> Result<()> {
    let (_, tracker) = test_tracker();

    tracker
        .start_processing("m3", &[Channel::Email, Channel::Push])
        .await?;

    let email_update = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move {
            tracker
                .update_channel_status("m3", Channel::Email, ChannelOutcome::Completed)
                .await
        })
    };
    let push_update = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move {
            tracker
                .update_channel_status("m3", Channel::Push, ChannelOutcome::Completed)
                .await
        })
    };

    email_update.await??;
    push_update.await??;

    let record = tracker.processing_record("m3").await?.unwrap();
    assert_eq!(record.status, ProcessingStatus::Completed);
    assert!(
        record
            .channels
            .values()
            .all(|ch| ch.status == ChannelStatus::Completed)
    );

    Ok(())
}

/// Test: records past the processing window disappear after cleanup
#[tokio::test]
async fn test_cleanup_removes_stale_records() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let window = Duration::from_secs(60);
    let tracker = IdempotencyTracker::new(store.clone(), window);

    // A record claimed two windows ago, still present in the store.
    let stale = serde_json::json!({
        "status": "processing",
        "startedAt": chrono::Utc::now().timestamp_millis() - 2 * 60_000,
        "channels": { "push": { "status": "pending" } }
    });
    store
        .put_if_absent(
            "notification:stale",
            &stale.to_string(),
            Duration::from_secs(600),
        )
        .await?;

    tracker.start_processing("fresh", &[Channel::Push]).await?;

    let removed = tracker.cleanup().await?;
    assert_eq!(removed, 1, "Only the stale record should be swept");

    assert!(!tracker.is_processing("stale").await?);
    assert!(tracker.is_processing("fresh").await?);

    Ok(())
}

/// Test: the store TTL expires unswept records on its own
#[tokio::test]
async fn test_record_self_expires_via_ttl() -> Result<()> {
    let (_, tracker) = tracker_with_window(Duration::from_millis(50));

    tracker.start_processing("ttl", &[Channel::Sms]).await?;
    assert!(tracker.is_processing("ttl").await?);

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!tracker.is_processing("ttl").await?);
    assert!(!tracker.has_been_processed("ttl").await?);

    // The slot is claimable again once the record expired.
    assert!(tracker.start_processing("ttl", &[Channel::Sms]).await?);

    Ok(())
}

/// Test: updating a channel on a missing record is a no-op, not an error
#[tokio::test]
async fn test_update_without_record_is_noop() -> Result<()> {
    let (_, tracker) = test_tracker();

    tracker
        .update_channel_status("ghost", Channel::Email, ChannelOutcome::Completed)
        .await?;

    assert!(tracker.processing_record("ghost").await?.is_none());

    Ok(())
}

/// Test: store primitives honor conditional-write semantics
#[tokio::test]
async fn test_memory_store_conditional_writes() -> Result<()> {
    let store = MemoryStore::new();
    let ttl = Duration::from_secs(10);

    assert!(store.put_if_absent("k", "v1", ttl).await?);
    assert!(!store.put_if_absent("k", "v2", ttl).await?);
    assert_eq!(store.get("k").await?.as_deref(), Some("v1"));

    assert!(!store.compare_and_swap("k", "wrong", "v3", ttl).await?);
    assert!(store.compare_and_swap("k", "v1", "v3", ttl).await?);
    assert_eq!(store.get("k").await?.as_deref(), Some("v3"));

    store.put_if_absent("prefix:a", "x", ttl).await?;
    store.put_if_absent("prefix:b", "y", ttl).await?;
    let mut keys = store.scan_keys("prefix:").await?;
    keys.sort();
    assert_eq!(keys, vec!["prefix:a", "prefix:b"]);

    store.delete("k").await?;
    assert_eq!(store.get("k").await?, None);

    Ok(())
}
