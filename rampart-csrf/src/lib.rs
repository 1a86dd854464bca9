//! # Rampart CSRF Protection
//!
//! Stateful CSRF token synchronization for Rampart applications.
//!
//! Implements the synchronizer token pattern: tokens are opaque random
//! handles whose full lifecycle (issuance, verification, rotation,
//! revocation, expiry) is managed server-side.
//!
//! ## Features
//!
//! - **Synchronizer tokens** - server-side token records, not signed blobs
//! - **Session binding** - tokens verify only against their issuing session
//! - **Use-count ceiling** - bounds the blast radius of a leaked token
//! - **Idempotent issuance** - concurrent page renders share one token
//! - **Rotation** - over-age tokens are replaced, with a grace window
//! - **Pluggable storage** - in-memory by default, Redis behind a feature
//! - **Background sweep** - expired and terminal records are evicted
//! - **Middleware integration** - header/cookie/body extraction, legacy
//!   double-submit fallback, structured 403 denials
//!
//! ## Quick Start
//!
//! ```
//! use rampart_csrf::{CsrfSyncConfig, CsrfSyncManager};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = CsrfSyncManager::in_memory(CsrfSyncConfig::default())?;
//!
//! // Issuance is idempotent per session
//! let token = manager.generate_token("session-1", None).await?;
//! let again = manager.generate_token("session-1", None).await?;
//! assert_eq!(token.token, again.token);
//!
//! // Verification is bound to the issuing session
//! assert!(manager.verify_token(&token.token, "session-1", None).await?);
//! assert!(!manager.verify_token(&token.token, "session-2", None).await?);
//!
//! manager.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Middleware
//!
//! ```
//! use std::sync::Arc;
//! use rampart_core::HttpRequest;
//! use rampart_csrf::{
//!     CsrfMiddleware, CsrfMiddlewareConfig, CsrfSyncConfig, CsrfSyncManager,
//!     SessionIdentity, SessionResolver,
//! };
//!
//! struct HeaderResolver;
//!
//! #[async_trait::async_trait]
//! impl SessionResolver for HeaderResolver {
//!     async fn resolve(&self, request: &HttpRequest) -> Option<SessionIdentity> {
//!         request.header("x-session-id").map(|id| SessionIdentity {
//!             session_id: id.clone(),
//!             user_id: None,
//!             email_verified: false,
//!         })
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = Arc::new(CsrfSyncManager::in_memory(CsrfSyncConfig::default())?);
//! let middleware = CsrfMiddleware::new(
//!     CsrfMiddlewareConfig::default(),
//!     manager.clone(),
//!     Arc::new(HeaderResolver),
//! );
//!
//! // Mutating request without a token is denied with a structured 403
//! let request = HttpRequest::new("POST", "/api/posts");
//! let denied = middleware.handle(&request).await;
//! assert_eq!(denied.unwrap().status, 403);
//!
//! manager.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod middleware;
pub mod record;
pub mod store;

pub use config::{CsrfMiddlewareConfig, CsrfSyncConfig};
pub use error::{CsrfError, CsrfResult};
pub use lifecycle::TokenLifecycle;
pub use manager::CsrfSyncManager;
pub use middleware::{CsrfMiddleware, DENY_CODE, SessionIdentity, SessionResolver, meta_tag};
pub use record::{RequestContext, TokenRecord, TokenState, generate_token_value};
pub use store::{MemoryTokenStore, StoreStats, TokenStore};
#[cfg(feature = "redis")]
pub use store::RedisTokenStore;
