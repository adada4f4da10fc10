mod common;

use common::TestApp;
use reqwest::Method;
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn free_plan_allows_one_academy() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    app.create_academy(owner, "Club Norte").await;

    let response = app
        .as_user(Method::POST, "/api/academies", owner)
        .json(&json!({ "name": "Club Sur" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let list: Value = app
        .as_user(Method::GET, "/api/academies", owner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["total"], 1);
    assert_eq!(list["items"][0]["slug"], "club-norte");
}

#[tokio::test]
async fn duplicate_slug_is_a_conflict() {
    let app = TestApp::spawn().await;
    app.create_academy(Uuid::new_v4(), "Flip Academy").await;

    let response = app
        .as_user(Method::POST, "/api/academies", Uuid::new_v4())
        .json(&json!({ "name": "Flip  academy!" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn invalid_payload_is_unprocessable() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let academy = app.create_academy(owner, "Club Norte").await;

    let response = app
        .in_academy(Method::POST, "/api/athletes", owner, academy)
        .json(&json!({ "first_name": "", "last_name": "Ruiz" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
    let body: Value = response.json().await.unwrap();
    assert!(body["details"].get("first_name").is_some());
}

#[tokio::test]
async fn athlete_limit_is_enforced_and_delete_is_soft() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let academy = app.create_academy(owner, "Club Norte").await;

    let mut athletes = Vec::new();
    for i in 0..15 {
        athletes.push(app.create_athlete(owner, academy, &format!("Athlete{}", i)).await);
    }

    let over = app
        .in_academy(Method::POST, "/api/athletes", owner, academy)
        .json(&json!({ "first_name": "One", "last_name": "Toomany" }))
        .send()
        .await
        .unwrap();
    assert_eq!(over.status(), 403);

    let path = format!("/api/athletes/{}", athletes[0]);
    let deleted = app
        .in_academy(Method::DELETE, &path, owner, academy)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);

    let athlete: Value = app
        .in_academy(Method::GET, &path, owner, academy)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(athlete["status"], "inactive");

    let active: Value = app
        .in_academy(Method::GET, "/api/athletes?status=active", owner, academy)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(active["total"], 14);

    // The freed slot can be used again.
    let again = app
        .in_academy(Method::POST, "/api/athletes", owner, academy)
        .json(&json!({ "first_name": "Back", "last_name": "Fill" }))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 201);

    let reactivate = app
        .in_academy(Method::PATCH, &path, owner, academy)
        .json(&json!({ "status": "active" }))
        .send()
        .await
        .unwrap();
    assert_eq!(reactivate.status(), 403);
}

#[tokio::test]
async fn guardians_link_and_unlink() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let academy = app.create_academy(owner, "Club Norte").await;
    let athlete = app.create_athlete(owner, academy, "Ana").await;
    let guardian = app
        .create_in(
            owner,
            academy,
            "/api/guardians",
            json!({ "full_name": "Marta Ruiz", "email": "marta@example.com" }),
            "guardian_id",
        )
        .await;

    let path = format!("/api/athletes/{}/guardians", athlete);
    let linked = app
        .in_academy(Method::POST, &path, owner, academy)
        .json(&json!({ "guardian_id": guardian }))
        .send()
        .await
        .unwrap();
    assert_eq!(linked.status(), 201);
    let body: Value = linked.json().await.unwrap();
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["email"], "marta@example.com");

    let unlinked = app
        .in_academy(
            Method::DELETE,
            &format!("{}/{}", path, guardian),
            owner,
            academy,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(unlinked.status(), 204);

    let again = app
        .in_academy(
            Method::DELETE,
            &format!("{}/{}", path, guardian),
            owner,
            academy,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 404);
}

#[tokio::test]
async fn classes_record_attendance_once_per_session() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let academy = app.create_academy(owner, "Club Norte").await;
    let athlete = app.create_athlete(owner, academy, "Ana").await;
    let class = app
        .create_in(
            owner,
            academy,
            "/api/classes",
            json!({ "name": "Beam", "weekday": 2, "start_time": "9:30", "duration_minutes": 60 }),
            "class_id",
        )
        .await;

    let path = format!("/api/classes/{}/attendance", class);
    for status in ["present", "late"] {
        let response = app
            .in_academy(Method::POST, &path, owner, academy)
            .json(&json!({ "athlete_id": athlete, "session_date": "2026-03-04", "status": status }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
    }

    let records: Value = app
        .in_academy(Method::GET, &format!("{}?date=2026-03-04", path), owner, academy)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(records["total"], 1);
    assert_eq!(records["items"][0]["status"], "late");

    let class_body: Value = app
        .in_academy(Method::GET, &format!("/api/classes/{}", class), owner, academy)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(class_body["start_time"], "09:30");
}

#[tokio::test]
async fn directory_lists_public_academies_only() {
    let app = TestApp::spawn().await;
    app.create_academy(Uuid::new_v4(), "Gimnasia Valencia").await;
    let private_owner = Uuid::new_v4();
    app.as_user(Method::POST, "/api/academies", private_owner)
        .json(&json!({ "name": "Private Club", "city": "Valencia", "is_public": false }))
        .send()
        .await
        .unwrap();

    let listing: Value = app
        .client
        .get(app.url("/public/academies?city=valencia"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["items"][0]["slug"], "gimnasia-valencia");
    assert!(listing["items"][0].get("owner_id").is_none());

    let found = app
        .client
        .get(app.url("/public/academies/gimnasia-valencia"))
        .send()
        .await
        .unwrap();
    assert_eq!(found.status(), 200);

    let hidden = app
        .client
        .get(app.url("/public/academies/private-club"))
        .send()
        .await
        .unwrap();
    assert_eq!(hidden.status(), 404);
}
