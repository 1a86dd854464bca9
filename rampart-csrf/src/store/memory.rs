//! In-memory token storage implementation.

use crate::error::CsrfResult;
use crate::record::{RequestContext, TokenRecord, TokenState};
use crate::store::{StoreStats, TokenStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    records: HashMap<String, TokenRecord>,
    // session id -> token values, in insertion order
    by_session: HashMap<String, Vec<String>>,
}

/// In-memory token store.
///
/// The default backend: a token map plus a session index behind a single
/// `RwLock`. Every mutating operation runs under the write lock, so the
/// use-count check-and-increment is atomic without further machinery.
#[derive(Default)]
pub struct MemoryTokenStore {
    inner: RwLock<Inner>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn put(&self, record: TokenRecord) -> CsrfResult<()> {
        let mut inner = self.inner.write().await;
        let tokens = inner.by_session.entry(record.session_id.clone()).or_default();
        if !tokens.contains(&record.token) {
            tokens.push(record.token.clone());
        }
        inner.records.insert(record.token.clone(), record);
        Ok(())
    }

    async fn get(&self, token: &str) -> CsrfResult<Option<TokenRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.records.get(token).cloned())
    }

    async fn get_by_session(&self, session_id: &str) -> CsrfResult<Option<TokenRecord>> {
        let inner = self.inner.read().await;
        let Some(tokens) = inner.by_session.get(session_id) else {
            return Ok(None);
        };
        // Newest verifiable record wins (rotation can leave an older one
        // inside its grace window).
        Ok(tokens
            .iter()
            .rev()
            .filter_map(|t| inner.records.get(t))
            .find(|r| r.is_verifiable())
            .cloned())
    }

    async fn delete(&self, token: &str) -> CsrfResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.records.remove(token) {
            if let Some(tokens) = inner.by_session.get_mut(&record.session_id) {
                tokens.retain(|t| t != token);
                if tokens.is_empty() {
                    inner.by_session.remove(&record.session_id);
                }
            }
        }
        Ok(())
    }

    async fn delete_by_session(&self, session_id: &str) -> CsrfResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(tokens) = inner.by_session.remove(session_id) {
            for token in tokens {
                inner.records.remove(&token);
            }
        }
        Ok(())
    }

    async fn list_by_session(&self, session_id: &str) -> CsrfResult<Vec<TokenRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_session
            .get(session_id)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(|t| inner.records.get(t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_state(&self, token: &str, state: TokenState) -> CsrfResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.records.get_mut(token) {
            record.state = state;
        }
        Ok(())
    }

    async fn mark_used(
        &self,
        token: &str,
        max_use_count: u32,
        context: Option<&RequestContext>,
    ) -> CsrfResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.records.get_mut(token) else {
            return Ok(false);
        };
        if record.use_count >= max_use_count {
            return Ok(false);
        }
        record.use_count += 1;
        record.last_used_at = Some(Utc::now());
        if let Some(context) = context {
            record.metadata = Some(context.clone());
        }
        Ok(true)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> CsrfResult<usize> {
        let mut inner = self.inner.write().await;
        let doomed: Vec<String> = inner
            .records
            .values()
            .filter(|r| {
                now > r.expires_at
                    || r.state == TokenState::Expired
                    || r.state == TokenState::Revoked
            })
            .map(|r| r.token.clone())
            .collect();

        for token in &doomed {
            if let Some(record) = inner.records.remove(token) {
                if let Some(tokens) = inner.by_session.get_mut(&record.session_id) {
                    tokens.retain(|t| t != token);
                    if tokens.is_empty() {
                        inner.by_session.remove(&record.session_id);
                    }
                }
            }
        }
        Ok(doomed.len())
    }

    async fn stats(&self) -> CsrfResult<StoreStats> {
        let inner = self.inner.read().await;
        let mut stats = StoreStats {
            total_tokens: inner.records.len(),
            ..Default::default()
        };
        for record in inner.records.values() {
            match record.state {
                TokenState::Active => stats.active_tokens += 1,
                TokenState::Expired => stats.expired_tokens += 1,
                TokenState::Revoked => stats.revoked_tokens += 1,
            }
        }
        Ok(stats)
    }
}
