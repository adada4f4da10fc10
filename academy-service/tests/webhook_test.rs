mod common;

use common::TestApp;
use reqwest::Method;
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn unsigned_or_tampered_webhooks_are_rejected() {
    let app = TestApp::spawn().await;
    let payload = json!({ "id": "evt_1", "type": "ping", "data": { "object": {} } });

    let unsigned = app
        .client
        .post(app.url("/webhooks/payments"))
        .body(payload.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(unsigned.status(), 401);

    let forged = app
        .client
        .post(app.url("/webhooks/payments"))
        .header("Stripe-Signature", "t=1700000000,v1=deadbeef")
        .body(payload.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), 401);
}

#[tokio::test]
async fn unknown_events_are_acknowledged() {
    let app = TestApp::spawn().await;

    let response = app
        .send_webhook(&json!({ "id": "evt_2", "type": "charge.refunded", "data": { "object": {} } }))
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["received"], true);
    assert_eq!(body["outcome"], "ignored");
}

#[tokio::test]
async fn completed_checkout_marks_the_charge_paid() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let academy = app.create_academy(owner, "Club Norte").await;
    let athlete = app.create_athlete(owner, academy, "Ana").await;
    let charge = app
        .create_in(
            owner,
            academy,
            "/api/charges",
            json!({ "athlete_id": athlete, "amount_cents": 5000, "due_date": "2026-03-05" }),
            "charge_id",
        )
        .await;

    let event = json!({
        "id": "evt_3",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_test_1",
            "metadata": { "charge_id": charge.to_string(), "academy_id": academy.to_string() }
        } }
    });
    let response = app.send_webhook(&event).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "applied");

    let stored: Value = app
        .in_academy(Method::GET, &format!("/api/charges/{}", charge), owner, academy)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored["status"], "paid");
    assert_eq!(stored["payment_method"], "card");
    assert_eq!(stored["amount_paid_cents"], 5000);

    // Redelivery leaves the charge as it is.
    let again: Value = app.send_webhook(&event).await.json().await.unwrap();
    assert_eq!(again["outcome"], "ignored");
}

#[tokio::test]
async fn subscription_lifecycle_follows_processor_events() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();

    let completed = app
        .send_webhook(&json!({
            "id": "evt_4",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_2",
                "customer": "cus_123",
                "subscription": "sub_123",
                "metadata": { "owner_id": owner.to_string(), "plan_code": "pro" }
            } }
        }))
        .await;
    assert_eq!(completed.status(), 200);

    let subscription: Value = app
        .as_user(Method::GET, "/api/subscription", owner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(subscription["subscription"]["plan_code"], "pro");
    assert_eq!(subscription["subscription"]["status"], "active");
    assert_eq!(subscription["limits"]["academies"], 3);

    let invoice = app
        .send_webhook(&json!({
            "id": "evt_5",
            "type": "invoice.paid",
            "data": { "object": {
                "id": "in_1",
                "customer": "cus_123",
                "amount_paid": 4900,
                "currency": "eur",
                "status": "paid"
            } }
        }))
        .await;
    assert_eq!(invoice.status(), 200);

    let invoices: Value = app
        .as_user(Method::GET, "/api/subscription/invoices", owner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(invoices["total"], 1);
    assert_eq!(invoices["items"][0]["amount_cents"], 4900);
    assert_eq!(invoices["items"][0]["currency"], "EUR");

    let portal = app
        .as_user(Method::POST, "/api/subscription/portal", owner)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(portal.status(), 200);

    let deleted = app
        .send_webhook(&json!({
            "id": "evt_6",
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_123", "customer": "cus_123", "status": "canceled" } }
        }))
        .await;
    assert_eq!(deleted.status(), 200);

    let subscription: Value = app
        .as_user(Method::GET, "/api/subscription", owner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(subscription["subscription"]["plan_code"], "free");
    assert_eq!(subscription["subscription"]["status"], "cancelled");
}
