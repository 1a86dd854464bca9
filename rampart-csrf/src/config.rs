//! Configuration for the sync manager and the middleware.

use crate::error::{CsrfError, CsrfResult};
use std::time::Duration;

/// Configuration for [`CsrfSyncManager`](crate::CsrfSyncManager).
///
/// All fields have safe defaults; `validate` is called at manager
/// construction and fails fast on nonsensical values.
#[derive(Debug, Clone)]
pub struct CsrfSyncConfig {
    /// Bytes of entropy per token (the stored value is twice as many hex chars)
    pub token_length: usize,

    /// Token time-to-live
    pub token_ttl: Duration,

    /// Maximum successful verifications per token
    pub max_use_count: u32,

    /// Age after which issuance mints a fresh token instead of reusing
    pub rotation_interval: Duration,

    /// How long a rotated-out token stays verifiable
    pub rotation_grace: Duration,

    /// Interval between background expiry sweeps
    pub sweep_interval: Duration,

    /// Bind tokens to the issuing session. Disabling this is a
    /// reduced-security mode for stateless/multi-session setups.
    pub session_binding: bool,

    /// Master switch for verification. When false, every token passes —
    /// an emergency bypass, not a normal mode.
    pub enable_synchronizer: bool,

    /// Key prefix for external store backends
    pub key_prefix: String,
}

impl Default for CsrfSyncConfig {
    fn default() -> Self {
        Self {
            token_length: 32,
            token_ttl: Duration::from_secs(24 * 60 * 60),
            max_use_count: 100,
            rotation_interval: Duration::from_secs(60 * 60),
            rotation_grace: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            session_binding: true,
            enable_synchronizer: true,
            key_prefix: "csrf:".to_string(),
        }
    }
}

impl CsrfSyncConfig {
    /// Set token length in bytes.
    pub fn with_token_length(mut self, length: usize) -> Self {
        self.token_length = length;
        self
    }

    /// Set token TTL.
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Set the use-count ceiling.
    pub fn with_max_use_count(mut self, max: u32) -> Self {
        self.max_use_count = max;
        self
    }

    /// Set the rotation interval.
    pub fn with_rotation_interval(mut self, interval: Duration) -> Self {
        self.rotation_interval = interval;
        self
    }

    /// Set the rotation grace window.
    pub fn with_rotation_grace(mut self, grace: Duration) -> Self {
        self.rotation_grace = grace;
        self
    }

    /// Set the background sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Enable or disable session binding.
    pub fn with_session_binding(mut self, enabled: bool) -> Self {
        self.session_binding = enabled;
        self
    }

    /// Enable or disable verification entirely.
    pub fn with_synchronizer(mut self, enabled: bool) -> Self {
        self.enable_synchronizer = enabled;
        self
    }

    /// Set the store key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Validate the configuration, failing fast on invalid values.
    pub fn validate(&self) -> CsrfResult<()> {
        if self.token_length < 16 {
            return Err(CsrfError::Config(
                "token_length must be at least 16 bytes".to_string(),
            ));
        }
        if self.token_ttl.is_zero() {
            return Err(CsrfError::Config("token_ttl must be non-zero".to_string()));
        }
        if self.max_use_count == 0 {
            return Err(CsrfError::Config(
                "max_use_count must be at least 1".to_string(),
            ));
        }
        if self.rotation_interval.is_zero() {
            return Err(CsrfError::Config(
                "rotation_interval must be non-zero".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(CsrfError::Config(
                "sweep_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for [`CsrfMiddleware`](crate::CsrfMiddleware).
#[derive(Debug, Clone)]
pub struct CsrfMiddlewareConfig {
    /// Header the token is read from (primary channel)
    pub header_name: String,

    /// Cookie the token is read from (double-submit fallback channel)
    pub cookie_name: String,

    /// Public cookie readable by page scripts
    pub public_cookie_name: String,

    /// Cookie names accepted by the legacy double-submit comparison
    pub legacy_cookie_names: Vec<String>,

    /// Form/JSON field names the token is read from
    pub field_names: Vec<String>,

    /// HTTP methods that skip CSRF checks
    pub safe_methods: Vec<String>,

    /// Path prefixes that skip CSRF checks
    pub exclude_paths: Vec<String>,

    /// Route verification through the sync manager
    pub enable_sync_manager: bool,

    /// Fall back to double-submit cookie comparison when the manager
    /// path is unavailable or denies
    pub fallback_to_legacy: bool,

    /// Always allow. Local development only; logged loudly when active.
    pub development_bypass: bool,

    /// Mark issued cookies `Secure`
    pub cookie_secure: bool,
}

impl Default for CsrfMiddlewareConfig {
    fn default() -> Self {
        Self {
            header_name: "x-csrf-token".to_string(),
            cookie_name: "csrf-token".to_string(),
            public_cookie_name: "csrf-token-public".to_string(),
            legacy_cookie_names: vec![
                "app-csrf-token".to_string(),
                "csrf-token-public".to_string(),
                "__Host-csrf".to_string(),
            ],
            field_names: vec!["_csrf".to_string(), "csrf_token".to_string()],
            safe_methods: vec![
                "GET".to_string(),
                "HEAD".to_string(),
                "OPTIONS".to_string(),
            ],
            exclude_paths: vec![
                "/api/auth".to_string(),
                "/api/health".to_string(),
                "/api/register".to_string(),
                "/api/verify-email".to_string(),
                "/api/csrf".to_string(),
            ],
            enable_sync_manager: true,
            fallback_to_legacy: true,
            development_bypass: false,
            cookie_secure: true,
        }
    }
}

impl CsrfMiddlewareConfig {
    /// Set the token header name.
    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    /// Set the token cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set the legacy double-submit cookie names.
    pub fn with_legacy_cookie_names(mut self, names: Vec<String>) -> Self {
        self.legacy_cookie_names = names;
        self
    }

    /// Set excluded path prefixes.
    pub fn with_exclude_paths(mut self, paths: Vec<String>) -> Self {
        self.exclude_paths = paths;
        self
    }

    /// Set safe methods.
    pub fn with_safe_methods(mut self, methods: Vec<String>) -> Self {
        self.safe_methods = methods;
        self
    }

    /// Enable or disable the sync-manager verification path.
    pub fn with_sync_manager(mut self, enabled: bool) -> Self {
        self.enable_sync_manager = enabled;
        self
    }

    /// Enable or disable the legacy double-submit fallback.
    pub fn with_legacy_fallback(mut self, enabled: bool) -> Self {
        self.fallback_to_legacy = enabled;
        self
    }

    /// Enable or disable the development bypass.
    pub fn with_development_bypass(mut self, enabled: bool) -> Self {
        self.development_bypass = enabled;
        self
    }

    /// Set the cookie `Secure` flag.
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_config_defaults() {
        let config = CsrfSyncConfig::default();
        assert_eq!(config.token_length, 32);
        assert_eq!(config.token_ttl, Duration::from_secs(86400));
        assert_eq!(config.max_use_count, 100);
        assert!(config.session_binding);
        assert!(config.enable_synchronizer);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sync_config_builder() {
        let config = CsrfSyncConfig::default()
            .with_token_length(48)
            .with_token_ttl(Duration::from_secs(3600))
            .with_max_use_count(5)
            .with_session_binding(false)
            .with_key_prefix("app:csrf:");

        assert_eq!(config.token_length, 48);
        assert_eq!(config.max_use_count, 5);
        assert!(!config.session_binding);
        assert_eq!(config.key_prefix, "app:csrf:");
    }

    #[test]
    fn test_sync_config_validation() {
        assert!(CsrfSyncConfig::default()
            .with_token_length(8)
            .validate()
            .is_err());
        assert!(CsrfSyncConfig::default()
            .with_token_ttl(Duration::ZERO)
            .validate()
            .is_err());
        assert!(CsrfSyncConfig::default()
            .with_max_use_count(0)
            .validate()
            .is_err());
        assert!(CsrfSyncConfig::default()
            .with_sweep_interval(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_middleware_config_defaults() {
        let config = CsrfMiddlewareConfig::default();
        assert_eq!(config.header_name, "x-csrf-token");
        assert!(config.enable_sync_manager);
        assert!(config.fallback_to_legacy);
        assert!(!config.development_bypass);
        assert!(config.safe_methods.contains(&"GET".to_string()));
        assert!(config.exclude_paths.contains(&"/api/health".to_string()));
    }

    #[test]
    fn test_middleware_config_builder() {
        let config = CsrfMiddlewareConfig::default()
            .with_header_name("x-app-csrf")
            .with_development_bypass(true)
            .with_legacy_fallback(false);

        assert_eq!(config.header_name, "x-app-csrf");
        assert!(config.development_bypass);
        assert!(!config.fallback_to_legacy);
    }
}
