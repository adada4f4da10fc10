mod common;

use common::TestApp;
use reqwest::Method;
use uuid::Uuid;

#[tokio::test]
async fn health_check_returns_200() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn readiness_and_metrics_are_served() {
    let app = TestApp::spawn().await;

    let ready = app.client.get(app.url("/ready")).send().await.unwrap();
    assert_eq!(ready.status(), 200);

    let metrics = app.client.get(app.url("/metrics")).send().await.unwrap();
    assert_eq!(metrics.status(), 200);
}

#[tokio::test]
async fn api_requires_user_header() {
    let app = TestApp::spawn().await;

    let missing = app
        .client
        .get(app.url("/api/academies"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 401);

    let invalid = app
        .client
        .get(app.url("/api/academies"))
        .header("X-User-ID", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 401);
}

#[tokio::test]
async fn academy_scope_is_checked() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let academy_id = app.create_academy(owner, "Club Norte").await;

    let own = app
        .in_academy(Method::GET, "/api/academy", owner, academy_id)
        .send()
        .await
        .unwrap();
    assert_eq!(own.status(), 200);

    let stranger = app
        .in_academy(Method::GET, "/api/academy", Uuid::new_v4(), academy_id)
        .send()
        .await
        .unwrap();
    assert_eq!(stranger.status(), 403);

    let unknown = app
        .in_academy(Method::GET, "/api/athletes", owner, Uuid::new_v4())
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);

    let no_academy = app
        .as_user(Method::GET, "/api/athletes", owner)
        .send()
        .await
        .unwrap();
    assert_eq!(no_academy.status(), 401);
}
