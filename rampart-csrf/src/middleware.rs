//! CSRF protection middleware: the HTTP boundary adapter.
//!
//! Extracts the token from the request, resolves the caller's session
//! through a [`SessionResolver`], and routes verification through the
//! [`CsrfSyncManager`]. Never touches the token store directly.

use crate::config::CsrfMiddlewareConfig;
use crate::error::CsrfResult;
use crate::manager::CsrfSyncManager;
use crate::record::{RequestContext, TokenRecord};
use async_trait::async_trait;
use chrono::Utc;
use log::{error, info, warn};
use rampart_core::{Error, HttpRequest, HttpResponse};
use std::sync::Arc;

/// Error code carried by every CSRF denial response.
pub const DENY_CODE: &str = "CSRF_VALIDATION_FAILED";

/// Identity of the session behind a request.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub session_id: String,
    pub user_id: Option<String>,
    pub email_verified: bool,
}

/// Session resolution contract.
///
/// Implemented by the application's authentication layer (cookie or JWT
/// introspection); the middleware only needs "this request maps to this
/// session, or to none".
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, request: &HttpRequest) -> Option<SessionIdentity>;
}

/// CSRF protection middleware.
#[derive(Clone)]
pub struct CsrfMiddleware {
    config: Arc<CsrfMiddlewareConfig>,
    manager: Arc<CsrfSyncManager>,
    resolver: Arc<dyn SessionResolver>,
}

impl CsrfMiddleware {
    /// Create new CSRF middleware.
    pub fn new(
        config: CsrfMiddlewareConfig,
        manager: Arc<CsrfSyncManager>,
        resolver: Arc<dyn SessionResolver>,
    ) -> Self {
        if config.development_bypass {
            warn!("CSRF development bypass is ACTIVE: all requests will be allowed");
        }
        Self {
            config: Arc::new(config),
            manager,
            resolver,
        }
    }

    /// Check if a request needs CSRF protection.
    ///
    /// Safe methods and excluded path prefixes skip the check.
    pub fn needs_protection(&self, request: &HttpRequest) -> bool {
        let method = request.method.to_uppercase();
        if self.config.safe_methods.contains(&method) {
            return false;
        }
        !self
            .config
            .exclude_paths
            .iter()
            .any(|prefix| request.path.starts_with(prefix))
    }

    /// Validate the CSRF token on a request.
    ///
    /// Returns `Ok(())` to allow. Denials are `Error::Forbidden`; a store
    /// failure without a legacy fallback configured surfaces as
    /// `Error::ServiceUnavailable` so the caller can distinguish "you sent
    /// a bad token" from "we could not check".
    pub async fn validate_request(&self, request: &HttpRequest) -> Result<(), Error> {
        if !self.needs_protection(request) {
            return Ok(());
        }

        if self.config.development_bypass {
            warn!(
                "CSRF development bypass allowing {} {}",
                request.method, request.path
            );
            return Ok(());
        }

        let Some(token) = self.extract_token(request) else {
            return Err(Error::Forbidden(format!(
                "Missing CSRF token. Provide token in '{}' header or '{}' cookie",
                self.config.header_name, self.config.cookie_name
            )));
        };

        if self.config.enable_sync_manager {
            match self.verify_with_manager(request, &token).await {
                Ok(true) => return Ok(()),
                Ok(false) => {} // fall through to the legacy path
                Err(e) => {
                    error!("CSRF sync verification unavailable: {}", e);
                    if !self.config.fallback_to_legacy {
                        return Err(Error::ServiceUnavailable(
                            "CSRF verification unavailable".to_string(),
                        ));
                    }
                }
            }
        }

        if self.config.fallback_to_legacy && self.legacy_verify(request, &token) {
            info!("CSRF legacy double-submit verification succeeded");
            return Ok(());
        }

        Err(Error::Forbidden("CSRF token validation failed".to_string()))
    }

    /// Verify through the sync manager. `Ok(false)` is a deny; `Err` means
    /// the check itself could not run.
    async fn verify_with_manager(
        &self,
        request: &HttpRequest,
        token: &str,
    ) -> CsrfResult<bool> {
        let session_id = match self.resolver.resolve(request).await {
            Some(identity) => identity.session_id,
            None => {
                // Without a session there is no binding to check; only a
                // manager running unbound can verify such a request
                if self.manager.session_binding() {
                    return Ok(false);
                }
                String::new()
            }
        };

        let context = Self::request_context(request);
        self.manager
            .verify_token(token, &session_id, Some(&context))
            .await
    }

    /// Extract the CSRF token: header first, then cookie, then body.
    pub fn extract_token(&self, request: &HttpRequest) -> Option<String> {
        if let Some(token) = request.header(&self.config.header_name) {
            return Some(token.clone());
        }

        if let Some(token) = request.cookie(&self.config.cookie_name) {
            return Some(token);
        }

        let content_type = request.header("Content-Type").cloned().unwrap_or_default();

        if content_type.contains("application/json") {
            if let Ok(json) = serde_json::from_slice::<serde_json::Value>(&request.body) {
                for field in &self.config.field_names {
                    if let Some(token) = json.get(field).and_then(|v| v.as_str()) {
                        return Some(token.to_string());
                    }
                }
            }
        }

        if content_type.contains("application/x-www-form-urlencoded") {
            if let Ok(form) =
                serde_urlencoded::from_bytes::<Vec<(String, String)>>(&request.body)
            {
                for (key, value) in form {
                    if self.config.field_names.contains(&key) {
                        return Some(value);
                    }
                }
            }
        }

        None
    }

    /// Legacy double-submit comparison: the presented token must equal one
    /// of the known CSRF cookies.
    fn legacy_verify(&self, request: &HttpRequest, token: &str) -> bool {
        self.config
            .legacy_cookie_names
            .iter()
            .any(|name| request.cookie(name).as_deref() == Some(token))
    }

    fn request_context(request: &HttpRequest) -> RequestContext {
        RequestContext {
            ip_address: request.header("x-forwarded-for").cloned(),
            user_agent: request.header("user-agent").cloned(),
            request_url: Some(request.path.clone()),
        }
    }

    /// Issue a token for the request's session and package it as an HTTP
    /// response: JSON body, token header, and the cookie pair (an httpOnly
    /// one for server checks and a readable one for page scripts).
    ///
    /// Anonymous requests get a throwaway session id so pre-login forms
    /// still carry a token.
    pub async fn issue_token(&self, request: &HttpRequest) -> CsrfResult<HttpResponse> {
        let (session_id, user_id) = match self.resolver.resolve(request).await {
            Some(identity) => (identity.session_id, identity.user_id),
            None => (crate::record::generate_token_value(16), None),
        };

        let record = self
            .manager
            .generate_token(&session_id, user_id.as_deref())
            .await?;

        let max_age = (record.expires_at - Utc::now()).num_seconds().max(0);
        let response = HttpResponse::ok()
            .with_json(&serde_json::json!({
                "token": record.token,
                "header": self.config.header_name,
                "expiresAt": record.expires_at.timestamp_millis(),
            }))
            .map_err(|e| crate::error::CsrfError::Serialization(e.to_string()))?
            .with_header("X-CSRF-Token".to_string(), record.token.clone())
            .add_cookie(self.build_cookie(&self.config.cookie_name, &record.token, max_age, true))
            .add_cookie(self.build_cookie(
                &self.config.public_cookie_name,
                &record.token,
                max_age,
                false,
            ));

        Ok(response)
    }

    fn build_cookie(&self, name: &str, value: &str, max_age: i64, http_only: bool) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; SameSite=Strict",
            name, value, max_age
        );
        if http_only {
            cookie.push_str("; HttpOnly");
        }
        if self.config.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Build the structured 403 denial response.
    pub fn deny_response(message: &str) -> HttpResponse {
        HttpResponse::forbidden()
            .with_json(&serde_json::json!({
                "error": message,
                "code": DENY_CODE,
            }))
            .unwrap_or_else(|_| HttpResponse::forbidden())
    }

    /// Run the validation and translate a denial into its HTTP response.
    ///
    /// `None` means the request may proceed.
    pub async fn handle(&self, request: &HttpRequest) -> Option<HttpResponse> {
        match self.validate_request(request).await {
            Ok(()) => None,
            Err(e) => {
                let mut response = Self::deny_response(&e.to_string());
                response.status = e.status_code();
                Some(response)
            }
        }
    }
}

/// Render the meta tag pages embed so client scripts can echo the token.
pub fn meta_tag(record: &TokenRecord) -> String {
    format!(
        "<meta name=\"app-csrf-token\" content=\"{}\">",
        record.token
    )
}
