//! Session recognition and the configured failure responses.

use axum::http::StatusCode;
use lumen_conformance::{
    ALICE, ALICE_SESSION, BOB, EXPIRED_SESSION, TestApp, TestRequest,
};
use chrono::{Duration, Utc};
use lumen_core::{Session, SessionId, Username};
use lumen_gateway::config::AuthFailureMode;

#[tokio::test]
async fn test_valid_session_populates_context() {
    let app = TestApp::new();
    let response = app.send(TestRequest::get("/api/whoami").as_alice()).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["username"], ALICE);
    assert_eq!(body["session"], ALICE_SESSION);
    assert_eq!(body["has_permissions"], true);
    assert_eq!(body["has_metadata"], true);
    assert!(body["transaction"].is_null());
}

#[tokio::test]
async fn test_api_paths_get_401() {
    let app = TestApp::new();

    let cases = [
        TestRequest::get("/api/whoami"),
        TestRequest::get("/api/whoami").cookie("username", ALICE),
        TestRequest::get("/api/whoami").cookie("session_id", ALICE_SESSION),
        TestRequest::get("/api/whoami").session(ALICE, EXPIRED_SESSION),
        TestRequest::get("/api/whoami").session(BOB, ALICE_SESSION),
        TestRequest::get("/api/whoami").session(ALICE, "sess-unknown"),
    ];
    for request in cases {
        let response = app.send(request).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.text(), "Authentication required");
    }
}

#[tokio::test]
async fn test_pages_redirect_to_login() {
    let app = TestApp::new();
    let response = app.send(TestRequest::get("/console")).await;

    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(response.header("location"), Some("/login"));

    let ok = app.send(TestRequest::get("/console").as_alice()).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.text(), "console");
}

#[tokio::test]
async fn test_failure_mode_overrides_path() {
    let strict = TestApp::with_config(|c| c.auth.failure_mode = AuthFailureMode::Unauthorized);
    assert_eq!(
        strict.send(TestRequest::get("/console")).await.status,
        StatusCode::UNAUTHORIZED
    );

    let redirect = TestApp::with_config(|c| {
        c.auth.failure_mode = AuthFailureMode::Redirect;
        c.auth.login_path = "/signin".to_string();
    });
    let response = redirect.send(TestRequest::get("/api/whoami")).await;
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(response.header("location"), Some("/signin"));
}

#[tokio::test]
async fn test_ended_session_takes_effect_immediately() {
    let app = TestApp::new();
    assert_eq!(
        app.send(TestRequest::get("/api/whoami").as_alice()).await.status,
        StatusCode::OK
    );

    app.store
        .insert_session(Session {
            id: SessionId::new(ALICE_SESSION),
            username: Username::parse(ALICE).expect("valid username"),
            expires_at: Utc::now() - Duration::seconds(1),
            csrf_token: None,
        })
        .await;
    assert_eq!(
        app.send(TestRequest::get("/api/whoami").as_alice()).await.status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_optional_auth_never_rejects() {
    let app = TestApp::new();

    let anonymous = app.send(TestRequest::get("/api/me")).await;
    assert_eq!(anonymous.status, StatusCode::OK);
    assert_eq!(anonymous.text(), "anonymous");

    let alice = app.send(TestRequest::get("/api/me").as_alice()).await;
    assert_eq!(alice.text(), ALICE);
}

#[tokio::test]
async fn test_transaction_cookies_injected() {
    let app = TestApp::new();
    let response = app
        .send(
            TestRequest::get("/api/whoami")
                .as_alice()
                .cookie("transaction_id", "tx-17")
                .cookie("transaction_active", "TRUE"),
        )
        .await;
    let body = response.json();
    assert_eq!(body["transaction"]["id"], "tx-17");
    assert_eq!(body["transaction"]["active"], true);

    let inactive = app
        .send(
            TestRequest::get("/api/whoami")
                .as_alice()
                .cookie("transaction_id", "tx-18")
                .cookie("transaction_active", "yes"),
        )
        .await;
    assert_eq!(inactive.json()["transaction"]["active"], false);
}
