//! Database, table and per-verb gates over the fixture grants.

use axum::http::StatusCode;
use lumen_conformance::{ALICE, BOB, BOB_SESSION, TestApp, TestRequest};

fn target(path: &str, database: &str, table: &str) -> String {
    format!("{path}?database={database}&schema=public&table={table}")
}

#[tokio::test]
async fn test_select_allowed_on_granted_tables() {
    let app = TestApp::new();
    for table in ["users", "orders"] {
        let response = app
            .send(TestRequest::get(target("/api/rows", "testdb", table)).as_alice())
            .await;
        assert_eq!(response.status, StatusCode::OK, "{table}");
        assert_eq!(response.json()["user"], ALICE);
    }
}

#[tokio::test]
async fn test_unknown_targets_forbidden() {
    let app = TestApp::new();
    let cases = [
        target("/api/rows", "otherdb", "users"),
        target("/api/rows", "testdb", "secrets"),
        "/api/rows?database=testdb&table=users".to_string(),
        "/api/rows?database=testdb&schema=Public&table=users".to_string(),
        "/api/rows".to_string(),
    ];
    for uri in cases {
        let response = app.send(TestRequest::get(uri.clone()).as_alice()).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(response.text(), "Permission denied");
    }
}

#[tokio::test]
async fn test_verb_gates() {
    let app = TestApp::new();

    let insert_users = app
        .send(
            TestRequest::post(target("/api/rows/insert", "testdb", "users"))
                .as_alice()
                .with_csrf(),
        )
        .await;
    assert_eq!(insert_users.status, StatusCode::OK);

    let insert_orders = app
        .send(
            TestRequest::post(target("/api/rows/insert", "testdb", "orders"))
                .as_alice()
                .with_csrf(),
        )
        .await;
    assert_eq!(insert_orders.status, StatusCode::FORBIDDEN);

    let delete_users = app
        .send(
            TestRequest::post(target("/api/rows/delete", "testdb", "users"))
                .as_alice()
                .with_csrf(),
        )
        .await;
    assert_eq!(delete_users.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_role_without_grants_forbidden() {
    let app = TestApp::new();
    let response = app
        .send(TestRequest::get(target("/api/rows", "testdb", "users")).session(BOB, BOB_SESSION))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}
