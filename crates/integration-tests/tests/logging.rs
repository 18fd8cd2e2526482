//! Structured log events emitted by the pipeline.

use std::io;
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use lumen_conformance::{TestApp, TestRequest};
use serde_json::json;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("log buffer poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer poisoned")).into_owned()
    }
}

fn capture() -> (Captured, tracing::subscriber::DefaultGuard) {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    (captured, tracing::subscriber::set_default(subscriber))
}

#[tokio::test]
async fn test_security_event_logged_with_request_id() {
    let (captured, _guard) = capture();
    let app = TestApp::new();

    let response = app
        .send(
            TestRequest::get("/api/locked")
                .as_alice()
                .header("x-request-id", "log-me-403")
                .header("x-forwarded-for", "192.0.2.44"),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let logs = captured.text();
    let event = logs
        .lines()
        .find(|line| line.contains("Security event"))
        .expect("security event logged");
    assert!(event.contains("log-me-403"), "{event}");
    assert!(event.contains("192.0.2.44"), "{event}");
    assert!(event.contains("alice"), "{event}");
}

#[tokio::test]
async fn test_authorization_denial_logged() {
    let (captured, _guard) = capture();
    let app = TestApp::new();

    let response = app
        .send(
            TestRequest::get("/api/rows?database=otherdb&schema=public&table=users")
                .as_alice()
                .header("x-request-id", "log-me-gate"),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let logs = captured.text();
    let event = logs
        .lines()
        .find(|line| line.contains("Authorization denied"))
        .expect("denial logged");
    assert!(event.contains("log-me-gate"), "{event}");
    assert!(event.contains("otherdb"), "{event}");
}

#[tokio::test]
async fn test_query_and_request_logged() {
    let (captured, _guard) = capture();
    let app = TestApp::new();

    let response = app
        .send(
            TestRequest::post("/api/query")
                .as_alice()
                .with_csrf()
                .header("x-request-id", "log-me-sql")
                .json(&json!({ "query": "SELECT  id\nFROM users" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let logs = captured.text();
    let query = logs
        .lines()
        .find(|line| line.contains("Query executed"))
        .expect("query logged");
    assert!(query.contains("SELECT id FROM users"), "{query}");
    assert!(query.contains("log-me-sql"), "{query}");

    let completed = logs
        .lines()
        .find(|line| line.contains("Request completed"))
        .expect("request logged");
    assert!(completed.contains("log-me-sql"), "{completed}");
    assert!(completed.contains("/api/query"), "{completed}");
}

#[tokio::test]
async fn test_panic_logged() {
    let (captured, _guard) = capture();
    let app = TestApp::new();

    let response = app
        .send(TestRequest::get("/api/panic").header("x-request-id", "log-me-panic"))
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

    let logs = captured.text();
    let event = logs
        .lines()
        .find(|line| line.contains("Recovered from panic"))
        .expect("panic logged");
    assert!(event.contains("handler exploded"), "{event}");
    assert!(event.contains("log-me-panic"), "{event}");
}

#[tokio::test]
async fn test_panic_after_authentication_logs_user() {
    let (captured, _guard) = capture();
    let app = TestApp::new();

    let response = app
        .send(
            TestRequest::get("/api/panic")
                .as_alice()
                .header("x-request-id", "log-me-panic-alice"),
        )
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

    let logs = captured.text();
    let event = logs
        .lines()
        .find(|line| line.contains("Recovered from panic"))
        .expect("panic logged");
    assert!(event.contains("log-me-panic-alice"), "{event}");
    assert!(event.contains("\"user\":\"alice\""), "{event}");
    assert!(event.contains("\"session_present\":true"), "{event}");
}
