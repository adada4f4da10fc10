mod common;

use common::TestApp;
use reqwest::Method;
use serde_json::{json, Value};
use uuid::Uuid;

async fn change_plan(app: &TestApp, owner: Uuid, body: Value) -> (u16, Value) {
    let response = app
        .as_user(Method::POST, "/api/subscription/plan", owner)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

async fn subscribe_through_checkout(app: &TestApp, owner: Uuid, plan_code: &str) {
    let response = app
        .send_webhook(&json!({
            "id": format!("evt_{}", Uuid::new_v4()),
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_plan",
                "customer": format!("cus_{}", owner.simple()),
                "metadata": { "owner_id": owner.to_string(), "plan_code": plan_code }
            } }
        }))
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn upgrades_must_go_through_checkout() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();

    let (status, _) = change_plan(&app, owner, json!({ "plan_code": "enterprise" })).await;
    assert_eq!(status, 400);

    let body: Value = app
        .as_user(Method::GET, "/api/subscription", owner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["subscription"]["plan_code"], "free");

    subscribe_through_checkout(&app, owner, "pro").await;
    let (status, _) = change_plan(&app, owner, json!({ "plan_code": "enterprise", "force": true })).await;
    assert_eq!(status, 400);

    let (status, body) = change_plan(&app, owner, json!({ "plan_code": "starter" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["applied"], true);
    assert_eq!(body["forced"], false);
    assert_eq!(body["plan_code"], "starter");
}

#[tokio::test]
async fn owners_start_on_the_free_plan() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();

    let body: Value = app
        .as_user(Method::GET, "/api/subscription", owner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["subscription"]["plan_code"], "free");
    assert_eq!(body["limits"]["groups"], 3);
    assert_eq!(body["usage"]["academies"], 0);
    assert_eq!(body["violations"], json!([]));
}

#[tokio::test]
async fn downgrade_over_limits_needs_force() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let academy = app.create_academy(owner, "Club Norte").await;

    subscribe_through_checkout(&app, owner, "pro").await;

    for i in 0..4 {
        app.create_in(
            owner,
            academy,
            "/api/groups",
            json!({ "name": format!("Group {}", i) }),
            "group_id",
        )
        .await;
    }

    let (status, body) = change_plan(&app, owner, json!({ "plan_code": "free" })).await;
    assert_eq!(status, 409);
    assert_eq!(body["applied"], false);
    assert_eq!(body["plan_code"], "pro");
    assert!(body.get("forced").is_none());
    let violations = body["violations"].as_array().unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0]["resource"], "groups");
    assert_eq!(violations[0]["current"], 4);
    assert_eq!(violations[0]["limit"], 3);
    assert_eq!(violations[0]["excess"], 1);

    let (status, body) =
        change_plan(&app, owner, json!({ "plan_code": "free", "force": true })).await;
    assert_eq!(status, 200);
    assert_eq!(body["applied"], true);
    assert_eq!(body["plan_code"], "free");
    assert_eq!(body["forced"], true);

    let notifications: Value = app
        .as_user(Method::GET, "/api/notifications?unread_only=true", owner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(notifications["total"], 1);
    assert_eq!(notifications["items"][0]["kind"], "plan_limit_exceeded");
    let notification_id = notifications["items"][0]["notification_id"]
        .as_str()
        .unwrap()
        .to_string();

    let over = app
        .in_academy(Method::POST, "/api/groups", owner, academy)
        .json(&json!({ "name": "One more" }))
        .send()
        .await
        .unwrap();
    assert_eq!(over.status(), 403);

    let read = app
        .as_user(
            Method::POST,
            &format!("/api/notifications/{}/read", notification_id),
            owner,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(read.status(), 200);

    let unread: Value = app
        .as_user(Method::GET, "/api/notifications?unread_only=true", owner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unread["total"], 0);
}

#[tokio::test]
async fn subscription_checkout_requires_a_paid_priced_plan() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();

    let free = app
        .as_user(Method::POST, "/api/subscription/checkout", owner)
        .json(&json!({ "plan_code": "free" }))
        .send()
        .await
        .unwrap();
    assert_eq!(free.status(), 400);

    let unpriced = app
        .as_user(Method::POST, "/api/subscription/checkout", owner)
        .json(&json!({ "plan_code": "starter" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unpriced.status(), 400);

    let pro = app
        .as_user(Method::POST, "/api/subscription/checkout", owner)
        .json(&json!({ "plan_code": "pro" }))
        .send()
        .await
        .unwrap();
    assert_eq!(pro.status(), 200);
    let session: Value = pro.json().await.unwrap();
    assert!(session["url"]
        .as_str()
        .unwrap()
        .starts_with("https://checkout.mock.local/"));

    let portal = app
        .as_user(Method::POST, "/api/subscription/portal", owner)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(portal.status(), 400);
}
