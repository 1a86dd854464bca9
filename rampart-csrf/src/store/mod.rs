//! Token store trait definition.

use crate::error::CsrfResult;
use crate::record::{RequestContext, TokenRecord, TokenState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryTokenStore;
#[cfg(feature = "redis")]
pub use redis::RedisTokenStore;

/// Token counts by state, computed by full scan.
///
/// Token populations are small (one active token per live session), so a
/// scan is acceptable; this is an operational surface, not a hot path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_tokens: usize,
    pub active_tokens: usize,
    pub expired_tokens: usize,
    pub revoked_tokens: usize,
}

/// Token store trait for different storage backends.
///
/// Only the lifecycle layer mutates the store; the middleware always goes
/// through [`CsrfSyncManager`](crate::CsrfSyncManager).
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert or overwrite a record, keyed by token value.
    ///
    /// Also maintains the session index used by `get_by_session` and the
    /// bulk session operations.
    async fn put(&self, record: TokenRecord) -> CsrfResult<()>;

    /// Get a record by token value.
    async fn get(&self, token: &str) -> CsrfResult<Option<TokenRecord>>;

    /// Get the current verifiable record for a session, if any.
    ///
    /// When several records exist for the session (e.g. during a rotation
    /// grace window), the most recently created verifiable one wins.
    async fn get_by_session(&self, session_id: &str) -> CsrfResult<Option<TokenRecord>>;

    /// Delete a record by token value.
    async fn delete(&self, token: &str) -> CsrfResult<()>;

    /// Delete every record bound to a session.
    async fn delete_by_session(&self, session_id: &str) -> CsrfResult<()>;

    /// List every record bound to a session, regardless of state.
    async fn list_by_session(&self, session_id: &str) -> CsrfResult<Vec<TokenRecord>>;

    /// Transition a record's state. Unknown tokens are a no-op.
    ///
    /// The transition is atomic per record, which is what makes bulk
    /// revocation all-or-nothing from a concurrent verifier's view.
    async fn set_state(&self, token: &str, state: TokenState) -> CsrfResult<()>;

    /// Atomically increment a record's use count if it is below
    /// `max_use_count`, stamping `last_used_at` and merging `context`.
    ///
    /// Returns `Ok(true)` if the caller won the increment, `Ok(false)` if
    /// the record is unknown or already at the ceiling. Backends must make
    /// the check-and-increment a single atomic step; two concurrent
    /// verifications of a token with one use left must not both win.
    async fn mark_used(
        &self,
        token: &str,
        max_use_count: u32,
        context: Option<&RequestContext>,
    ) -> CsrfResult<bool>;

    /// Remove records past `now` and records in a terminal state.
    ///
    /// Returns the number removed; advisory, for metrics.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> CsrfResult<usize>;

    /// Count records by state.
    async fn stats(&self) -> CsrfResult<StoreStats>;
}
