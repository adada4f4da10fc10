mod common;

use common::TestApp;
use reqwest::Method;
use serde_json::{json, Value};
use uuid::Uuid;

struct Roster {
    owner: Uuid,
    academy: Uuid,
    group: Uuid,
    athletes: Vec<Uuid>,
}

/// Three members in a 50.00 group; the first pays a 20.00 custom fee.
async fn roster(app: &TestApp) -> Roster {
    let owner = Uuid::new_v4();
    let academy = app.create_academy(owner, "Club Norte").await;
    let group = app
        .create_in(
            owner,
            academy,
            "/api/groups",
            json!({ "name": "Juniors", "monthly_fee_cents": 5000 }),
            "group_id",
        )
        .await;

    let mut athletes = Vec::new();
    for (i, name) in ["Ana", "Bea", "Carla"].iter().enumerate() {
        let athlete = app.create_athlete(owner, academy, name).await;
        let custom_fee = if i == 0 { json!(2000) } else { Value::Null };
        let response = app
            .in_academy(
                Method::POST,
                &format!("/api/groups/{}/members", group),
                owner,
                academy,
            )
            .json(&json!({ "athlete_id": athlete, "custom_fee_cents": custom_fee }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        athletes.push(athlete);
    }

    Roster {
        owner,
        academy,
        group,
        athletes,
    }
}

async fn generate(app: &TestApp, r: &Roster, body: Value) -> Value {
    let response = app
        .in_academy(Method::POST, "/api/charges/generate", r.owner, r.academy)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    response.json().await.unwrap()
}

fn sorted_amounts(charges: &Value) -> Vec<i64> {
    let mut amounts: Vec<i64> = charges
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["amount_cents"].as_i64().unwrap())
        .collect();
    amounts.sort();
    amounts
}

async fn assert_generation_is_idempotent(app: &TestApp) {
    let r = roster(app).await;

    let first = generate(app, &r, json!({ "period": "2026-03" })).await;
    assert_eq!(first["created"], 3);
    assert_eq!(first["skipped"], 0);
    assert_eq!(sorted_amounts(&first["charges"]), vec![2000, 5000, 5000]);
    assert_eq!(first["charges"][0]["due_date"], "2026-03-05");
    assert_eq!(first["charges"][0]["status"], "pending");
    assert_eq!(first["charges"][0]["origin"], "generated");

    let second = generate(app, &r, json!({ "period": "2026-03" })).await;
    assert_eq!(second["created"], 0);
    assert_eq!(second["skipped"], 3);

    let listed: Value = app
        .in_academy(Method::GET, "/api/charges?period=2026-03", r.owner, r.academy)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["total"], 3);
}

#[tokio::test]
async fn generation_is_idempotent_per_period() {
    assert_generation_is_idempotent(&TestApp::spawn().await).await;
}

#[tokio::test]
async fn generation_is_idempotent_per_period_on_postgres() {
    let Some(app) = TestApp::spawn_postgres().await else {
        return;
    };
    assert_generation_is_idempotent(&app).await;
    app.cleanup().await;
}

async fn assert_regeneration_refreshes_only_pending(app: &TestApp) {
    let r = roster(app).await;
    let first = generate(app, &r, json!({ "period": "2026-04", "due_day": 10 })).await;

    let paid_id = first["charges"][0]["charge_id"].as_str().unwrap().to_string();
    let paid = app
        .in_academy(
            Method::POST,
            &format!("/api/charges/{}/pay", paid_id),
            r.owner,
            r.academy,
        )
        .json(&json!({ "payment_method": "cash" }))
        .send()
        .await
        .unwrap();
    assert_eq!(paid.status(), 200);

    let raise = app
        .in_academy(Method::PATCH, &format!("/api/groups/{}", r.group), r.owner, r.academy)
        .json(&json!({ "monthly_fee_cents": 6000 }))
        .send()
        .await
        .unwrap();
    assert_eq!(raise.status(), 200);

    let rerun = generate(
        app,
        &r,
        json!({ "period": "2026-04", "due_day": 10, "skip_duplicates": false }),
    )
    .await;
    assert_eq!(rerun["created"], 0);
    assert_eq!(rerun["updated"], 2);
    assert_eq!(rerun["skipped"], 1);

    let paid: Value = app
        .in_academy(Method::GET, &format!("/api/charges/{}", paid_id), r.owner, r.academy)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(paid["status"], "paid");
    assert_eq!(paid["payment_method"], "cash");
}

#[tokio::test]
async fn regeneration_refreshes_only_pending_charges() {
    assert_regeneration_refreshes_only_pending(&TestApp::spawn().await).await;
}

#[tokio::test]
async fn regeneration_refreshes_only_pending_charges_on_postgres() {
    let Some(app) = TestApp::spawn_postgres().await else {
        return;
    };
    assert_regeneration_refreshes_only_pending(&app).await;
    app.cleanup().await;
}

/// A manual charge for the same athlete and group blocks the generated one.
async fn assert_manual_charge_blocks_generation(app: &TestApp) {
    let r = roster(app).await;
    let manual = app
        .in_academy(Method::POST, "/api/charges", r.owner, r.academy)
        .json(&json!({
            "athlete_id": r.athletes[1],
            "group_id": r.group,
            "amount_cents": 5000,
            "description": "March tuition",
            "due_date": "2026-03-05"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(manual.status(), 201);

    let summary = generate(app, &r, json!({ "period": "2026-03" })).await;
    assert_eq!(summary["created"], 2);
    assert_eq!(summary["skipped"], 1);
    assert_eq!(sorted_amounts(&summary["charges"]), vec![2000, 5000]);

    let overwrite = generate(
        app,
        &r,
        json!({ "period": "2026-03", "skip_duplicates": false }),
    )
    .await;
    assert_eq!(overwrite["created"], 0);
    assert_eq!(overwrite["updated"], 2);
    assert_eq!(overwrite["skipped"], 1);

    let listed: Value = app
        .in_academy(
            Method::GET,
            &format!("/api/charges?period=2026-03&athlete_id={}", r.athletes[1]),
            r.owner,
            r.academy,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["items"][0]["origin"], "manual");
}

#[tokio::test]
async fn manual_charges_block_generation_for_the_same_group() {
    assert_manual_charge_blocks_generation(&TestApp::spawn().await).await;
}

#[tokio::test]
async fn manual_charges_block_generation_for_the_same_group_on_postgres() {
    let Some(app) = TestApp::spawn_postgres().await else {
        return;
    };
    assert_manual_charge_blocks_generation(&app).await;
    app.cleanup().await;
}

#[tokio::test]
async fn inactive_members_are_not_billed() {
    let app = TestApp::spawn().await;
    let r = roster(&app).await;

    let deleted = app
        .in_academy(
            Method::DELETE,
            &format!("/api/athletes/{}", r.athletes[1]),
            r.owner,
            r.academy,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);

    let summary = generate(&app, &r, json!({ "period": "2026-05" })).await;
    assert_eq!(summary["created"], 2);
    assert_eq!(sorted_amounts(&summary["charges"]), vec![2000, 5000]);
}

#[tokio::test]
async fn unpriced_memberships_are_reported() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let academy = app.create_academy(owner, "Club Norte").await;
    let group = app
        .create_in(owner, academy, "/api/groups", json!({ "name": "Open gym" }), "group_id")
        .await;
    let athlete = app.create_athlete(owner, academy, "Ana").await;
    app.in_academy(Method::POST, &format!("/api/groups/{}/members", group), owner, academy)
        .json(&json!({ "athlete_id": athlete }))
        .send()
        .await
        .unwrap();

    let response = app
        .in_academy(Method::POST, "/api/charges/generate", owner, academy)
        .json(&json!({ "period": "2026-03" }))
        .send()
        .await
        .unwrap();
    let summary: Value = response.json().await.unwrap();
    assert_eq!(summary["created"], 0);
    assert_eq!(summary["unpriced"][0]["group_name"], "Open gym");

    let bad_period = app
        .in_academy(Method::POST, "/api/charges/generate", owner, academy)
        .json(&json!({ "period": "2026-13" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_period.status(), 400);
}

#[tokio::test]
async fn status_changes_follow_the_state_machine() {
    let app = TestApp::spawn().await;
    let r = roster(&app).await;
    let charge = app
        .create_in(
            r.owner,
            r.academy,
            "/api/charges",
            json!({ "athlete_id": r.athletes[0], "amount_cents": 3000, "due_date": "2026-03-15" }),
            "charge_id",
        )
        .await;
    let path = format!("/api/charges/{}", charge);

    let partial: Value = app
        .in_academy(Method::PATCH, &path, r.owner, r.academy)
        .json(&json!({ "status": "partial", "amount_paid_cents": 1000 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(partial["status"], "partial");
    assert_eq!(partial["amount_paid_cents"], 1000);
    assert!(partial["paid_utc"].is_null());

    let paid: Value = app
        .in_academy(Method::PATCH, &path, r.owner, r.academy)
        .json(&json!({ "status": "paid", "payment_method": "transfer" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(paid["status"], "paid");
    assert_eq!(paid["amount_paid_cents"], 3000);
    assert!(paid["paid_utc"].is_string());

    let delete_paid = app
        .in_academy(Method::DELETE, &path, r.owner, r.academy)
        .send()
        .await
        .unwrap();
    assert_eq!(delete_paid.status(), 409);

    let reopened: Value = app
        .in_academy(Method::PATCH, &path, r.owner, r.academy)
        .json(&json!({ "status": "pending" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reopened["status"], "pending");
    assert!(reopened["paid_utc"].is_null());

    let cancelled = app
        .in_academy(Method::PATCH, &path, r.owner, r.academy)
        .json(&json!({ "status": "cancelled" }))
        .send()
        .await
        .unwrap();
    assert_eq!(cancelled.status(), 200);

    let pay_cancelled = app
        .in_academy(Method::PATCH, &path, r.owner, r.academy)
        .json(&json!({ "status": "paid" }))
        .send()
        .await
        .unwrap();
    assert_eq!(pay_cancelled.status(), 400);

    let payment_without_status = app
        .in_academy(Method::PATCH, &path, r.owner, r.academy)
        .json(&json!({ "payment_method": "cash" }))
        .send()
        .await
        .unwrap();
    assert_eq!(payment_without_status.status(), 400);

    let delete_cancelled = app
        .in_academy(Method::DELETE, &path, r.owner, r.academy)
        .send()
        .await
        .unwrap();
    assert_eq!(delete_cancelled.status(), 204);
}

#[tokio::test]
async fn billing_items_in_use_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let r = roster(&app).await;
    let item = app
        .create_in(
            r.owner,
            r.academy,
            "/api/billing-items",
            json!({ "name": "Competition fee", "amount_cents": 4500 }),
            "billing_item_id",
        )
        .await;

    let response = app
        .in_academy(Method::POST, "/api/charges", r.owner, r.academy)
        .json(&json!({
            "athlete_id": r.athletes[2],
            "billing_item_id": item,
            "due_date": "2026-06-01"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let charge: Value = response.json().await.unwrap();
    assert_eq!(charge["amount_cents"], 4500);
    assert_eq!(charge["currency"], "EUR");
    assert_eq!(charge["period"], "2026-06");
    assert_eq!(charge["description"], "Competition fee");
    assert_eq!(charge["origin"], "manual");

    let delete = app
        .in_academy(
            Method::DELETE,
            &format!("/api/billing-items/{}", item),
            r.owner,
            r.academy,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status(), 409);
}

#[tokio::test]
async fn checkout_creates_a_processor_session() {
    let app = TestApp::spawn().await;
    let r = roster(&app).await;
    let charge = app
        .create_in(
            r.owner,
            r.academy,
            "/api/charges",
            json!({ "athlete_id": r.athletes[0], "amount_cents": 2500, "due_date": "2026-03-15" }),
            "charge_id",
        )
        .await;

    let response = app
        .in_academy(
            Method::POST,
            &format!("/api/charges/{}/checkout", charge),
            r.owner,
            r.academy,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let session: Value = response.json().await.unwrap();
    let session_id = session["session_id"].as_str().unwrap().to_string();
    assert!(session_id.starts_with("cs_mock_"));
    assert_eq!(
        session["url"],
        format!("https://checkout.mock.local/{}", session_id)
    );

    let stored: Value = app
        .in_academy(Method::GET, &format!("/api/charges/{}", charge), r.owner, r.academy)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored["processor_session_id"], session_id);
}

#[tokio::test]
async fn charges_are_isolated_between_academies() {
    let app = TestApp::spawn().await;
    let r = roster(&app).await;
    let summary = generate(&app, &r, json!({ "period": "2026-03" })).await;
    let charge_id = summary["charges"][0]["charge_id"].as_str().unwrap().to_string();

    let other_owner = Uuid::new_v4();
    let other_academy = app.create_academy(other_owner, "Club Sur").await;
    let response = app
        .in_academy(
            Method::GET,
            &format!("/api/charges/{}", charge_id),
            other_owner,
            other_academy,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
