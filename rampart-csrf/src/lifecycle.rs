//! Token lifecycle rules: issuance, verification, rotation, revocation.
//!
//! Pure business rules over the store; no I/O of its own. Verification
//! failures are `Ok(false)`, never errors — only store trouble surfaces
//! as `Err`.

use crate::config::CsrfSyncConfig;
use crate::error::{CsrfError, CsrfResult};
use crate::record::{RequestContext, TokenRecord, TokenState};
use crate::store::TokenStore;
use chrono::Utc;
use log::{debug, warn};
use std::sync::Arc;

pub struct TokenLifecycle {
    store: Arc<dyn TokenStore>,
    config: CsrfSyncConfig,
}

impl TokenLifecycle {
    pub fn new(store: Arc<dyn TokenStore>, config: CsrfSyncConfig) -> Self {
        Self { store, config }
    }

    /// Issue a token for a session.
    ///
    /// Idempotent: if the session already holds a verifiable token younger
    /// than the rotation interval, that token is returned unchanged, so
    /// concurrent page renders within one session share one token. An
    /// over-age token is rotated: a fresh one is minted and the old one
    /// keeps a short grace window (its expiry is clamped) so forms already
    /// rendered with it still submit.
    pub async fn generate(
        &self,
        session_id: &str,
        user_id: Option<&str>,
    ) -> CsrfResult<TokenRecord> {
        if session_id.is_empty() {
            return Err(CsrfError::InvalidSessionId(
                "session id must not be empty".to_string(),
            ));
        }

        if let Some(existing) = self.store.get_by_session(session_id).await? {
            let age = Utc::now() - existing.created_at;
            let rotation_due = age
                .to_std()
                .map(|age| age >= self.config.rotation_interval)
                .unwrap_or(false);

            if !rotation_due {
                return Ok(existing);
            }

            debug!(
                "rotating token for session {} (age {}s)",
                session_id,
                age.num_seconds()
            );
            let grace_deadline = Utc::now()
                + chrono::Duration::from_std(self.config.rotation_grace).unwrap_or_default();
            if existing.expires_at > grace_deadline {
                let mut old = existing;
                old.expires_at = grace_deadline;
                self.store.put(old).await?;
            }
        }

        let record = TokenRecord::new(
            self.config.token_length,
            session_id,
            user_id.map(|u| u.to_string()),
            self.config.token_ttl,
        );
        self.store.put(record.clone()).await?;
        Ok(record)
    }

    /// Verify a token against a session.
    ///
    /// Check order: presence, session binding, state, expiry, use count.
    /// The use-count step is an atomic increment-and-compare in the store,
    /// so two concurrent verifications cannot both consume the last use.
    pub async fn verify(
        &self,
        token: &str,
        session_id: &str,
        context: Option<&RequestContext>,
    ) -> CsrfResult<bool> {
        if token.is_empty() {
            warn!("verification with empty token");
            return Ok(false);
        }
        if self.config.session_binding && session_id.is_empty() {
            warn!("verification with empty session id while binding is enabled");
            return Ok(false);
        }

        let preview: String = token.chars().take(10).collect();

        let Some(record) = self.store.get(token).await? else {
            warn!("unknown token {}...", preview);
            return Ok(false);
        };

        if self.config.session_binding && record.session_id != session_id {
            warn!("session mismatch for token {}...", preview);
            return Ok(false);
        }

        if record.state != TokenState::Active {
            debug!("token in state {:?} rejected", record.state);
            return Ok(false);
        }

        if record.is_expired() {
            // Lazy expiry: the sweep will purge it later
            self.store.set_state(token, TokenState::Expired).await?;
            debug!("token expired at {}", record.expires_at);
            return Ok(false);
        }

        if !self
            .store
            .mark_used(token, self.config.max_use_count, context)
            .await?
        {
            // Ceiling reached: retire the token so rotation is forced
            warn!(
                "token use count exceeded ({} max), revoking",
                self.config.max_use_count
            );
            self.store.set_state(token, TokenState::Revoked).await?;
            return Ok(false);
        }

        Ok(true)
    }

    /// Revoke a single token. Idempotent; unknown tokens are a no-op.
    pub async fn revoke(&self, token: &str) -> CsrfResult<()> {
        self.store.set_state(token, TokenState::Revoked).await
    }

    /// Revoke every token bound to a session (e.g. on logout).
    pub async fn revoke_all_for_session(&self, session_id: &str) -> CsrfResult<()> {
        for record in self.store.list_by_session(session_id).await? {
            self.store
                .set_state(&record.token, TokenState::Revoked)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTokenStore;
    use std::time::Duration;

    fn lifecycle(config: CsrfSyncConfig) -> TokenLifecycle {
        TokenLifecycle::new(Arc::new(MemoryTokenStore::new()), config)
    }

    #[tokio::test]
    async fn test_idempotent_issuance() {
        let lc = lifecycle(CsrfSyncConfig::default());
        let first = lc.generate("sess-1", None).await.unwrap();
        let second = lc.generate("sess-1", None).await.unwrap();
        assert_eq!(first.token, second.token);
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_session() {
        let lc = lifecycle(CsrfSyncConfig::default());
        assert!(matches!(
            lc.generate("", None).await,
            Err(CsrfError::InvalidSessionId(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_success_increments_use_count() {
        let store = Arc::new(MemoryTokenStore::new());
        let lc = TokenLifecycle::new(store.clone(), CsrfSyncConfig::default());
        let record = lc.generate("sess-1", None).await.unwrap();

        assert!(lc.verify(&record.token, "sess-1", None).await.unwrap());
        let stored = store.get(&record.token).await.unwrap().unwrap();
        assert_eq!(stored.use_count, 1);
    }

    #[tokio::test]
    async fn test_verify_rejects_wrong_session() {
        let lc = lifecycle(CsrfSyncConfig::default());
        let record = lc.generate("sess-a", None).await.unwrap();
        assert!(!lc.verify(&record.token, "sess-b", None).await.unwrap());
        // The failed attempt must not consume use budget
        assert!(lc.verify(&record.token, "sess-a", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_ignores_session_when_binding_disabled() {
        let lc = lifecycle(CsrfSyncConfig::default().with_session_binding(false));
        let record = lc.generate("sess-a", None).await.unwrap();
        assert!(lc.verify(&record.token, "sess-b", None).await.unwrap());
        assert!(lc.verify(&record.token, "", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_unknown_token() {
        let lc = lifecycle(CsrfSyncConfig::default());
        assert!(!lc.verify("not-a-real-token", "sess-1", None).await.unwrap());
        assert!(!lc.verify("", "sess-1", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_use_count_ceiling_revokes() {
        let store = Arc::new(MemoryTokenStore::new());
        let lc = TokenLifecycle::new(
            store.clone(),
            CsrfSyncConfig::default().with_max_use_count(1),
        );
        let record = lc.generate("sess-1", None).await.unwrap();

        assert!(lc.verify(&record.token, "sess-1", None).await.unwrap());
        assert!(!lc.verify(&record.token, "sess-1", None).await.unwrap());

        let stored = store.get(&record.token).await.unwrap().unwrap();
        assert_eq!(stored.state, TokenState::Revoked);
    }

    #[tokio::test]
    async fn test_revocation_is_terminal() {
        let lc = lifecycle(CsrfSyncConfig::default());
        let record = lc.generate("sess-1", None).await.unwrap();

        lc.revoke(&record.token).await.unwrap();
        assert!(!lc.verify(&record.token, "sess-1", None).await.unwrap());

        // Revoking again (or revoking garbage) is a no-op, not an error
        lc.revoke(&record.token).await.unwrap();
        lc.revoke("unknown").await.unwrap();
    }

    #[tokio::test]
    async fn test_bulk_revocation_is_scoped() {
        let lc = lifecycle(CsrfSyncConfig::default());
        let a = lc.generate("sess-a", None).await.unwrap();
        let b = lc.generate("sess-b", None).await.unwrap();

        lc.revoke_all_for_session("sess-a").await.unwrap();
        assert!(!lc.verify(&a.token, "sess-a", None).await.unwrap());
        assert!(lc.verify(&b.token, "sess-b", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_token_rejected_lazily() {
        let store = Arc::new(MemoryTokenStore::new());
        let lc = TokenLifecycle::new(store.clone(), CsrfSyncConfig::default());
        let record = lc.generate("sess-1", None).await.unwrap();

        let mut stale = store.get(&record.token).await.unwrap().unwrap();
        stale.expires_at = Utc::now() - chrono::Duration::seconds(1);
        store.put(stale).await.unwrap();

        assert!(!lc.verify(&record.token, "sess-1", None).await.unwrap());
        let stored = store.get(&record.token).await.unwrap().unwrap();
        assert_eq!(stored.state, TokenState::Expired);
    }

    #[tokio::test]
    async fn test_rotation_mints_new_token_with_grace() {
        let store = Arc::new(MemoryTokenStore::new());
        let config = CsrfSyncConfig::default()
            .with_rotation_interval(Duration::from_millis(10))
            .with_rotation_grace(Duration::from_secs(60));
        let lc = TokenLifecycle::new(store.clone(), config);

        let old = lc.generate("sess-1", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fresh = lc.generate("sess-1", None).await.unwrap();
        assert_ne!(old.token, fresh.token);

        // Old token survives inside the grace window
        assert!(lc.verify(&old.token, "sess-1", None).await.unwrap());
        let clamped = store.get(&old.token).await.unwrap().unwrap();
        assert!(clamped.expires_at < old.expires_at);

        // New issuance requests now return the fresh token
        let again = lc.generate("sess-1", None).await.unwrap();
        assert_eq!(again.token, fresh.token);
    }

    #[tokio::test]
    async fn test_verify_records_context() {
        let store = Arc::new(MemoryTokenStore::new());
        let lc = TokenLifecycle::new(store.clone(), CsrfSyncConfig::default());
        let record = lc.generate("sess-1", None).await.unwrap();

        let context = RequestContext {
            ip_address: Some("203.0.113.7".to_string()),
            user_agent: Some("test-agent".to_string()),
            request_url: None,
        };
        assert!(lc
            .verify(&record.token, "sess-1", Some(&context))
            .await
            .unwrap());

        let stored = store.get(&record.token).await.unwrap().unwrap();
        let metadata = stored.metadata.unwrap();
        assert_eq!(metadata.ip_address.as_deref(), Some("203.0.113.7"));
    }
}
