//! Integration tests for the CSRF middleware boundary.

use async_trait::async_trait;
use rampart_core::{Error, HttpRequest};
use rampart_csrf::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolver backed by a fixed map from bearer value to identity.
struct MapResolver(HashMap<String, SessionIdentity>);

#[async_trait]
impl SessionResolver for MapResolver {
    async fn resolve(&self, request: &HttpRequest) -> Option<SessionIdentity> {
        request
            .header("authorization")
            .and_then(|auth| self.0.get(auth))
            .cloned()
    }
}

struct Harness {
    manager: Arc<CsrfSyncManager>,
    middleware: CsrfMiddleware,
}

fn harness(sync_config: CsrfSyncConfig, mw_config: CsrfMiddlewareConfig) -> Harness {
    let manager = Arc::new(CsrfSyncManager::in_memory(sync_config).unwrap());
    let mut sessions = HashMap::new();
    sessions.insert(
        "bearer-1".to_string(),
        SessionIdentity {
            session_id: "sess-1".to_string(),
            user_id: Some("user-1".to_string()),
            email_verified: true,
        },
    );
    let middleware = CsrfMiddleware::new(mw_config, manager.clone(), Arc::new(MapResolver(sessions)));
    Harness {
        manager,
        middleware,
    }
}

fn authed_post(path: &str) -> HttpRequest {
    HttpRequest::new("POST", path).with_header("authorization", "bearer-1")
}

#[tokio::test]
async fn test_valid_token_allows_request() {
    let h = harness(CsrfSyncConfig::default(), CsrfMiddlewareConfig::default());
    let record = h.manager.generate_token("sess-1", None).await.unwrap();

    let request = authed_post("/api/posts").with_header("x-csrf-token", record.token);
    assert!(h.middleware.validate_request(&request).await.is_ok());
    h.manager.shutdown();
}

#[tokio::test]
async fn test_missing_token_denied_with_403() {
    let h = harness(CsrfSyncConfig::default(), CsrfMiddlewareConfig::default());

    let request = authed_post("/api/posts");
    let response = h.middleware.handle(&request).await.unwrap();
    assert_eq!(response.status, 403);

    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["code"], "CSRF_VALIDATION_FAILED");
    assert!(body["error"].as_str().unwrap().contains("Missing CSRF token"));
    h.manager.shutdown();
}

#[tokio::test]
async fn test_wrong_session_token_denied() {
    let h = harness(CsrfSyncConfig::default(), CsrfMiddlewareConfig::default());
    let record = h.manager.generate_token("someone-else", None).await.unwrap();

    let request = authed_post("/api/posts").with_header("x-csrf-token", record.token);
    let result = h.middleware.validate_request(&request).await;
    assert!(matches!(result, Err(Error::Forbidden(_))));
    h.manager.shutdown();
}

#[tokio::test]
async fn test_safe_and_excluded_requests_pass_untouched() {
    let h = harness(CsrfSyncConfig::default(), CsrfMiddlewareConfig::default());

    assert!(h
        .middleware
        .validate_request(&HttpRequest::new("GET", "/api/posts"))
        .await
        .is_ok());
    assert!(h
        .middleware
        .validate_request(&HttpRequest::new("POST", "/api/auth/login"))
        .await
        .is_ok());
    assert!(h.middleware.handle(&HttpRequest::new("GET", "/api/posts")).await.is_none());
    h.manager.shutdown();
}

#[tokio::test]
async fn test_token_from_cookie_verifies() {
    let h = harness(CsrfSyncConfig::default(), CsrfMiddlewareConfig::default());
    let record = h.manager.generate_token("sess-1", None).await.unwrap();

    let request =
        authed_post("/api/posts").with_header("Cookie", format!("csrf-token={}", record.token));
    assert!(h.middleware.validate_request(&request).await.is_ok());
    h.manager.shutdown();
}

#[tokio::test]
async fn test_token_from_json_body_verifies() {
    let h = harness(CsrfSyncConfig::default(), CsrfMiddlewareConfig::default());
    let record = h.manager.generate_token("sess-1", None).await.unwrap();

    let request = authed_post("/api/posts")
        .with_header("Content-Type", "application/json")
        .with_body(format!(r#"{{"_csrf":"{}","title":"hi"}}"#, record.token).into_bytes());
    assert!(h.middleware.validate_request(&request).await.is_ok());
    h.manager.shutdown();
}

#[tokio::test]
async fn test_development_bypass_allows_everything() {
    let h = harness(
        CsrfSyncConfig::default(),
        CsrfMiddlewareConfig::default().with_development_bypass(true),
    );

    let request = HttpRequest::new("POST", "/api/posts");
    assert!(h.middleware.validate_request(&request).await.is_ok());
    h.manager.shutdown();
}

#[tokio::test]
async fn test_synchronizer_kill_switch() {
    let h = harness(
        CsrfSyncConfig::default().with_synchronizer(false),
        CsrfMiddlewareConfig::default(),
    );

    // Any token passes while the kill switch is on
    let request = authed_post("/api/posts").with_header("x-csrf-token", "anything");
    assert!(h.middleware.validate_request(&request).await.is_ok());
    h.manager.shutdown();
}

#[tokio::test]
async fn test_legacy_fallback_double_submit() {
    let h = harness(CsrfSyncConfig::default(), CsrfMiddlewareConfig::default());

    // Anonymous request: no session to check binding against, but the
    // header token matches a known double-submit cookie
    let request = HttpRequest::new("POST", "/api/posts")
        .with_header("x-csrf-token", "fallback-token")
        .with_header("Cookie", "csrf-token-public=fallback-token");
    assert!(h.middleware.validate_request(&request).await.is_ok());

    // Mismatched cookie fails
    let request = HttpRequest::new("POST", "/api/posts")
        .with_header("x-csrf-token", "fallback-token")
        .with_header("Cookie", "csrf-token-public=other-value");
    assert!(h.middleware.validate_request(&request).await.is_err());
    h.manager.shutdown();
}

#[tokio::test]
async fn test_anonymous_denied_without_fallback() {
    let h = harness(
        CsrfSyncConfig::default(),
        CsrfMiddlewareConfig::default().with_legacy_fallback(false),
    );

    let request = HttpRequest::new("POST", "/api/posts").with_header("x-csrf-token", "whatever");
    assert!(matches!(
        h.middleware.validate_request(&request).await,
        Err(Error::Forbidden(_))
    ));
    h.manager.shutdown();
}

#[tokio::test]
async fn test_unbound_manager_accepts_anonymous_sessions() {
    let h = harness(
        CsrfSyncConfig::default().with_session_binding(false),
        CsrfMiddlewareConfig::default().with_legacy_fallback(false),
    );
    let record = h.manager.generate_token("sess-x", None).await.unwrap();

    // No resolvable session, but binding is off so the manager can still check
    let request = HttpRequest::new("POST", "/api/posts").with_header("x-csrf-token", record.token);
    assert!(h.middleware.validate_request(&request).await.is_ok());
    h.manager.shutdown();
}

#[tokio::test]
async fn test_issue_token_response() {
    let h = harness(CsrfSyncConfig::default(), CsrfMiddlewareConfig::default());

    let request = HttpRequest::new("GET", "/api/csrf").with_header("authorization", "bearer-1");
    let response = h.middleware.issue_token(&request).await.unwrap();

    assert_eq!(response.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    let token = body["token"].as_str().unwrap();
    assert_eq!(token.len(), 64);
    assert_eq!(body["header"], "x-csrf-token");
    assert!(body["expiresAt"].as_i64().unwrap() > 0);

    // Response carries the header and both cookies
    assert_eq!(response.headers.get("X-CSRF-Token").unwrap(), token);
    assert_eq!(response.cookies.len(), 2);
    assert!(response.cookies[0].contains("HttpOnly"));
    assert!(!response.cookies[1].contains("HttpOnly"));

    // The issued token verifies for the issuing session
    assert!(h.manager.verify_token(token, "sess-1", None).await.unwrap());
    h.manager.shutdown();
}

#[tokio::test]
async fn test_issue_token_is_idempotent_per_session() {
    let h = harness(CsrfSyncConfig::default(), CsrfMiddlewareConfig::default());

    let request = HttpRequest::new("GET", "/api/csrf").with_header("authorization", "bearer-1");
    let first = h.middleware.issue_token(&request).await.unwrap();
    let second = h.middleware.issue_token(&request).await.unwrap();

    let a: serde_json::Value = serde_json::from_slice(&first.body).unwrap();
    let b: serde_json::Value = serde_json::from_slice(&second.body).unwrap();
    assert_eq!(a["token"], b["token"]);
    h.manager.shutdown();
}

#[tokio::test]
async fn test_verification_failure_consumes_no_budget() {
    let h = harness(
        CsrfSyncConfig::default().with_max_use_count(1),
        CsrfMiddlewareConfig::default().with_legacy_fallback(false),
    );
    let record = h.manager.generate_token("sess-1", None).await.unwrap();

    // A garbage token attempt does not touch the real token's budget
    let bad = authed_post("/api/posts").with_header("x-csrf-token", "garbage");
    assert!(h.middleware.validate_request(&bad).await.is_err());

    let good = authed_post("/api/posts").with_header("x-csrf-token", record.token);
    assert!(h.middleware.validate_request(&good).await.is_ok());
    h.manager.shutdown();
}
