//! Token record and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle state of a CSRF token.
///
/// `Revoked` is terminal: a revoked token never verifies again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenState {
    /// Token is valid for verification
    Active,
    /// Token passed its expiry and was marked during a lazy check
    Expired,
    /// Token was explicitly invalidated
    Revoked,
}

/// Request metadata recorded on successful verification.
///
/// Diagnostic only: none of these fields gate the pass/fail decision.
/// They are kept as an extension point for anti-replay heuristics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_url: Option<String>,
}

/// A server-side CSRF token record.
///
/// The token value is an opaque random handle; all state lives in the
/// store, keyed by that value. `session_id` is immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Random token value (hex-encoded)
    pub token: String,

    /// Session this token is bound to
    pub session_id: String,

    /// Owning user, informational only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Lifecycle state
    pub state: TokenState,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,

    /// Last successful verification timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,

    /// Number of successful verifications
    pub use_count: u32,

    /// Metadata from the most recent verification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RequestContext>,
}

impl TokenRecord {
    /// Create a new active record with a freshly generated token value.
    pub fn new(
        token_length: usize,
        session_id: impl Into<String>,
        user_id: Option<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            token: generate_token_value(token_length),
            session_id: session_id.into(),
            user_id,
            state: TokenState::Active,
            created_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or_default(),
            last_used_at: None,
            use_count: 0,
            metadata: None,
        }
    }

    /// Check if the record is past its expiry.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Check if the record can still pass verification time/state-wise.
    pub fn is_verifiable(&self) -> bool {
        self.state == TokenState::Active && !self.is_expired()
    }
}

/// Generate a random token value: `length` bytes from a CSPRNG, hex-encoded.
pub fn generate_token_value(length: usize) -> String {
    use rand::Rng;
    let mut bytes = vec![0u8; length];
    rand::thread_rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}
