use thiserror::Error;

use crate::models::channel::Channel;

/// Errors from the shared key-value store backing the idempotency tracker.
///
/// Store unavailability always propagates to the caller; the dispatcher must
/// never assume a claim or update succeeded.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store command failed: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("record serialization failed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("concurrent update conflict on key {0}")]
    CasConflict(String),
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user directory query failed: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid payload: {0}")]
    Validation(String),

    #[error("provider initialization failed: {0}")]
    Init(String),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("{0} channel queue not initialized")]
    ChannelNotInitialized(Channel),

    #[error("{0} channel queue is closed")]
    Closed(Channel),
}

/// Per-event failures of the dispatch pipeline. Each one aborts the
/// remaining stages for that event only; the consumer loop keeps running.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed inbound event. Dropped, never retried.
    #[error("invalid notification event: {0}")]
    Validation(String),

    /// Native recipient missing from the user directory. Dropped, logged.
    #[error("recipient {0} not found in user directory")]
    RecipientNotFound(String),

    /// Idempotency store unavailable. Transient failure of the whole event;
    /// the delivery is requeued, never acked as processed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// User directory unavailable. Treated like a store outage.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl DispatchError {
    /// Whether the event should go back on the queue for another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, DispatchError::Store(_) | DispatchError::Directory(_))
    }
}
