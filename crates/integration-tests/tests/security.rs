//! Security headers, CSRF, cookie hardening, rate limiting and HTTPS.

use std::num::NonZeroU32;

use axum::http::StatusCode;
use lumen_conformance::{
    ALICE, ALICE_SESSION, ALICE_SESSION_CSRF, BOB, BOB_SESSION, DOUBLE_SUBMIT_TOKEN, TestApp,
    TestRequest,
};
use lumen_gateway::config::SameSitePolicy;

#[tokio::test]
async fn test_security_headers_present() {
    let app = TestApp::new();
    for request in [TestRequest::get("/api/me"), TestRequest::get("/api/whoami")] {
        let response = app.send(request).await;
        assert_eq!(response.header("x-content-type-options"), Some("nosniff"));
        assert_eq!(response.header("x-frame-options"), Some("DENY"));
        assert_eq!(response.header("x-xss-protection"), Some("1; mode=block"));
        assert_eq!(
            response.header("referrer-policy"),
            Some("strict-origin-when-cross-origin")
        );
        assert!(
            response
                .header("content-security-policy")
                .is_some_and(|csp| csp.contains("default-src 'self'"))
        );
        assert!(response.header("permissions-policy").is_some());
    }
}

#[tokio::test]
async fn test_csrf_double_submit() {
    let app = TestApp::new();

    let missing = app.send(TestRequest::post("/api/echo").form("a=1")).await;
    assert_eq!(missing.status, StatusCode::FORBIDDEN);
    assert_eq!(missing.text(), "CSRF token missing or invalid");

    let ok = app
        .send(TestRequest::post("/api/echo").with_csrf().form("a=1"))
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.text(), "a=1");

    let mismatch = app
        .send(
            TestRequest::post("/api/echo")
                .cookie("csrf_token", DOUBLE_SUBMIT_TOKEN)
                .header("x-csrf-token", "something-else")
                .form("a=1"),
        )
        .await;
    assert_eq!(mismatch.status, StatusCode::FORBIDDEN);

    let header_only = app
        .send(
            TestRequest::post("/api/echo")
                .header("x-csrf-token", DOUBLE_SUBMIT_TOKEN)
                .form("a=1"),
        )
        .await;
    assert_eq!(header_only.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_csrf_session_bound_token() {
    let app = TestApp::new();

    let bound = app
        .send(
            TestRequest::post("/api/echo")
                .session(ALICE, ALICE_SESSION)
                .header("x-csrf-token", ALICE_SESSION_CSRF)
                .form("a=1"),
        )
        .await;
    assert_eq!(bound.status, StatusCode::OK);

    let wrong_session = app
        .send(
            TestRequest::post("/api/echo")
                .session(BOB, BOB_SESSION)
                .header("x-csrf-token", ALICE_SESSION_CSRF)
                .form("a=1"),
        )
        .await;
    assert_eq!(wrong_session.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_safe_methods_skip_csrf_and_receive_token() {
    let app = TestApp::new();

    let response = app.send(TestRequest::get("/api/me")).await;
    assert_eq!(response.status, StatusCode::OK);
    let issued = response
        .set_cookies()
        .into_iter()
        .find(|c| c.starts_with("csrf_token="))
        .expect("csrf cookie issued");
    assert!(issued.contains("SameSite=Strict"));
    assert!(issued.contains("Path=/"));
    assert!(!issued.contains("HttpOnly"));

    let token = issued
        .trim_start_matches("csrf_token=")
        .split(';')
        .next()
        .unwrap_or_default()
        .to_string();
    let echoed = app
        .send(
            TestRequest::post("/api/echo")
                .cookie("csrf_token", &token)
                .header("x-csrf-token", &token)
                .form("b=2"),
        )
        .await;
    assert_eq!(echoed.status, StatusCode::OK);

    let returning = app
        .send(TestRequest::get("/api/me").cookie("csrf_token", &token))
        .await;
    assert!(
        returning
            .set_cookies()
            .iter()
            .all(|c| !c.starts_with("csrf_token="))
    );
}

#[tokio::test]
async fn test_same_site_enforced() {
    let lax = TestApp::new();
    let cookies = lax.send(TestRequest::get("/api/cookie")).await.set_cookies();
    let theme = cookies.iter().find(|c| c.starts_with("theme=")).expect("theme cookie");
    assert!(theme.contains("SameSite=Lax"), "{theme}");

    let strict = TestApp::with_config(|c| c.cookies.same_site = SameSitePolicy::Strict);
    let cookies = strict.send(TestRequest::get("/api/cookie")).await.set_cookies();
    let theme = cookies.iter().find(|c| c.starts_with("theme=")).expect("theme cookie");
    assert!(theme.contains("SameSite=Strict"), "{theme}");
}

#[tokio::test]
async fn test_cookie_integrity() {
    let app = TestApp::new();

    let signed = TestRequest::get("/api/me")
        .cookie("session_id", ALICE_SESSION)
        .signed_cookie(app.signer(), "username", ALICE);
    let response = app.send(signed).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), ALICE);

    let signature = app.signer().sign("username", ALICE);
    let tampered = TestRequest::get("/api/me")
        .cookie("session_id", ALICE_SESSION)
        .cookie("username", "mallory")
        .cookie("username_signature", &signature);
    assert_eq!(app.send(tampered).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let app = TestApp::with_config(|c| {
        c.rate_limit.per_minute = NonZeroU32::MIN;
        c.rate_limit.burst = NonZeroU32::new(2).unwrap_or(NonZeroU32::MIN);
    });
    let from = |ip: &str| TestRequest::get("/api/me").header("x-forwarded-for", ip);

    assert_eq!(app.send(from("203.0.113.5")).await.status, StatusCode::OK);
    assert_eq!(app.send(from("203.0.113.5")).await.status, StatusCode::OK);

    let limited = app.send(from("203.0.113.5")).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = limited
        .header("retry-after")
        .and_then(|v| v.parse().ok())
        .expect("Retry-After header");
    assert!(retry_after >= 1);
    assert!(limited.header("x-request-id").is_some());

    assert_eq!(app.send(from("198.51.100.7")).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_per_user_behind_one_ip() {
    let app = TestApp::with_config(|c| {
        c.rate_limit.per_minute = NonZeroU32::MIN;
        c.rate_limit.burst = NonZeroU32::MIN;
        c.rate_limit.key_by_user = true;
    });
    let from_office = |request: TestRequest| request.header("x-forwarded-for", "203.0.113.30");

    let alice = app.send(from_office(TestRequest::get("/api/whoami").as_alice())).await;
    assert_eq!(alice.status, StatusCode::OK);
    let bob = app
        .send(from_office(TestRequest::get("/api/whoami").session(BOB, BOB_SESSION)))
        .await;
    assert_eq!(bob.status, StatusCode::OK);

    let alice_again = app.send(from_office(TestRequest::get("/api/whoami").as_alice())).await;
    assert_eq!(alice_again.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_https_enforcement() {
    let app = TestApp::with_config(|c| c.cookies.strict_https = true);

    let plain = app
        .send(TestRequest::get("/api/me?x=1").header("host", "db.example.com:8080"))
        .await;
    assert_eq!(plain.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(plain.header("location"), Some("https://db.example.com/api/me?x=1"));

    let post = app
        .send(
            TestRequest::post("/api/echo")
                .header("host", "db.example.com")
                .with_csrf()
                .form("a=1"),
        )
        .await;
    assert_eq!(post.status, StatusCode::FOUND);

    let loopback = app
        .send(TestRequest::get("/api/me").header("host", "localhost:8081"))
        .await;
    assert_eq!(loopback.status, StatusCode::OK);

    let proxied = app
        .send(
            TestRequest::get("/api/me")
                .header("host", "db.example.com")
                .header("x-forwarded-proto", "https"),
        )
        .await;
    assert_eq!(proxied.status, StatusCode::OK);
}

#[tokio::test]
async fn test_https_redirect_ignores_unlisted_host() {
    let app = TestApp::with_config(|c| {
        c.cookies.strict_https = true;
        c.cookies.public_hosts = vec!["db.example.com".to_string()];
    });

    let listed = app
        .send(TestRequest::get("/api/me").header("host", "db.example.com"))
        .await;
    assert_eq!(listed.header("location"), Some("https://db.example.com/api/me"));

    let forged = app
        .send(TestRequest::get("/api/me").header("host", "attacker.example"))
        .await;
    assert_eq!(forged.status, StatusCode::BAD_REQUEST);
    assert_eq!(forged.header("location"), None);
}
