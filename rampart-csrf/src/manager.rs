//! The CSRF sync manager: facade over store + lifecycle, plus the
//! background expiry sweep.

use crate::config::CsrfSyncConfig;
use crate::error::CsrfResult;
use crate::lifecycle::TokenLifecycle;
use crate::record::{RequestContext, TokenRecord};
use crate::store::{MemoryTokenStore, StoreStats, TokenStore};
use chrono::Utc;
use log::{debug, error, warn};
use std::sync::Arc;
use std::sync::Mutex;
use tokio::task::JoinHandle;

/// Stateful CSRF token manager implementing the synchronizer token pattern.
///
/// Combines a pluggable [`TokenStore`] with the lifecycle rules and owns a
/// periodic sweep that evicts expired and terminal records. The sweep task
/// is a scoped resource: call [`shutdown`](Self::shutdown) for a clean
/// process exit (dropping the manager aborts the task as a backstop).
///
/// All operations are safe to call concurrently from multiple request
/// handlers; the use-count race at the ceiling is settled inside the store.
///
/// # Examples
///
/// ```
/// use rampart_csrf::{CsrfSyncConfig, CsrfSyncManager};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = CsrfSyncManager::in_memory(CsrfSyncConfig::default())?;
///
/// let record = manager.generate_token("session-1", None).await?;
/// assert!(manager.verify_token(&record.token, "session-1", None).await?);
///
/// manager.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct CsrfSyncManager {
    lifecycle: TokenLifecycle,
    store: Arc<dyn TokenStore>,
    config: CsrfSyncConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CsrfSyncManager {
    /// Create a manager over the given store.
    ///
    /// Validates the configuration (fail-fast) and starts the sweep task,
    /// so this must be called from within a Tokio runtime.
    pub fn new(config: CsrfSyncConfig, store: Arc<dyn TokenStore>) -> CsrfResult<Self> {
        config.validate()?;

        if !config.session_binding {
            warn!("session binding disabled: tokens verify against any session (reduced security)");
        }
        if !config.enable_synchronizer {
            warn!("synchronizer disabled: CSRF verification is bypassed entirely");
        }

        let sweeper = Self::spawn_sweeper(store.clone(), &config);
        Ok(Self {
            lifecycle: TokenLifecycle::new(store.clone(), config.clone()),
            store,
            config,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Create a manager backed by the in-memory store.
    pub fn in_memory(config: CsrfSyncConfig) -> CsrfResult<Self> {
        Self::new(config, Arc::new(MemoryTokenStore::new()))
    }

    fn spawn_sweeper(store: Arc<dyn TokenStore>, config: &CsrfSyncConfig) -> JoinHandle<()> {
        let period = config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; skip it so a fresh manager
            // does not sweep an empty store
            interval.tick().await;
            loop {
                interval.tick().await;
                match store.sweep_expired(Utc::now()).await {
                    Ok(removed) if removed > 0 => {
                        debug!("sweep evicted {} expired tokens", removed)
                    }
                    Ok(_) => {}
                    Err(e) => error!("expiry sweep failed: {}", e),
                }
            }
        })
    }

    /// Whether tokens are bound to their issuing session.
    pub fn session_binding(&self) -> bool {
        self.config.session_binding
    }

    /// Issue (or idempotently re-issue) a token for a session.
    pub async fn generate_token(
        &self,
        session_id: &str,
        user_id: Option<&str>,
    ) -> CsrfResult<TokenRecord> {
        self.lifecycle.generate(session_id, user_id).await
    }

    /// Verify a token against a session.
    ///
    /// Returns `Ok(false)` for every validation failure; `Err` only for
    /// store trouble, which the caller decides policy for. When the
    /// synchronizer is disabled everything passes.
    pub async fn verify_token(
        &self,
        token: &str,
        session_id: &str,
        context: Option<&RequestContext>,
    ) -> CsrfResult<bool> {
        if !self.config.enable_synchronizer {
            warn!("synchronizer disabled, allowing token without verification");
            return Ok(true);
        }
        self.lifecycle.verify(token, session_id, context).await
    }

    /// Revoke a single token. Idempotent.
    pub async fn revoke_token(&self, token: &str) -> CsrfResult<()> {
        self.lifecycle.revoke(token).await
    }

    /// Revoke every token bound to a session.
    pub async fn revoke_session_tokens(&self, session_id: &str) -> CsrfResult<()> {
        self.lifecycle.revoke_all_for_session(session_id).await
    }

    /// Token counts by state.
    pub async fn get_stats(&self) -> CsrfResult<StoreStats> {
        self.store.stats().await
    }

    /// Run one sweep pass immediately, returning the eviction count.
    pub async fn sweep_now(&self) -> CsrfResult<usize> {
        self.store.sweep_expired(Utc::now()).await
    }

    /// Stop the background sweep task.
    pub fn shutdown(&self) {
        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(handle) = sweeper.take() {
                handle.abort();
                debug!("sweep task stopped");
            }
        }
    }
}

impl Drop for CsrfSyncManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
