mod common;

use academy_service::services::charges::sweep_overdue;
use academy_service::services::email::{EmailOutbox, MockEmailProvider};
use academy_service::services::reminders::ReminderScanner;
use academy_service::services::store::EmailStore;
use academy_service::services::Store;
use chrono::{NaiveDate, Utc};
use common::TestApp;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn reminders_are_queued_once_and_delivered() {
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
    let linked = app
        .in_academy(
            Method::POST,
            &format!("/api/athletes/{}/guardians", athlete),
            owner,
            academy,
        )
        .json(&json!({ "guardian_id": guardian }))
        .send()
        .await
        .unwrap();
    assert_eq!(linked.status(), 201);

    for due_date in ["2026-03-13", "2026-03-01"] {
        app.create_in(
            owner,
            academy,
            "/api/charges",
            json!({ "athlete_id": athlete, "amount_cents": 5000, "due_date": due_date }),
            "charge_id",
        )
        .await;
    }

    let store: Arc<dyn Store> = app.store.clone();
    let provider = Arc::new(MockEmailProvider::new());
    let outbox = EmailOutbox::new(store.clone(), provider.clone(), 3);
    let scanner = ReminderScanner::new(store.clone(), outbox.clone(), 3);
    let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
    let now = Utc::now();

    let moved = sweep_overdue(store.as_ref(), today, now).await.unwrap();
    assert_eq!(moved, 1);

    let first = scanner.scan(today, now).await.unwrap();
    assert_eq!(first.scanned, 2);
    assert_eq!(first.enqueued, 2);

    let rerun = scanner.scan(today, now).await.unwrap();
    assert_eq!(rerun.enqueued, 0);
    assert_eq!(rerun.skipped, 2);

    let drained = outbox.drain(100, now).await.unwrap();
    assert_eq!(drained.sent, 2);
    assert_eq!(provider.send_count(), 2);

    let emails = app.store.list_emails(Some(academy)).await.unwrap();
    assert_eq!(emails.len(), 2);
    assert!(emails.iter().all(|e| e.status == "sent"));
    assert!(emails.iter().all(|e| e.recipient == "marta@example.com"));
    let mut kinds: Vec<&str> = emails.iter().map(|e| e.kind.as_str()).collect();
    kinds.sort();
    assert_eq!(kinds, vec!["reminder_overdue", "reminder_upcoming"]);
}

#[tokio::test]
async fn failed_sends_are_retried_later() {
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
    app.in_academy(
        Method::POST,
        &format!("/api/athletes/{}/guardians", athlete),
        owner,
        academy,
    )
    .json(&json!({ "guardian_id": guardian }))
    .send()
    .await
    .unwrap();
    app.create_in(
        owner,
        academy,
        "/api/charges",
        json!({ "athlete_id": athlete, "amount_cents": 5000, "due_date": "2026-03-13" }),
        "charge_id",
    )
    .await;

    let store: Arc<dyn Store> = app.store.clone();
    let provider = Arc::new(MockEmailProvider::new());
    let outbox = EmailOutbox::new(store.clone(), provider.clone(), 3);
    let scanner = ReminderScanner::new(store, outbox.clone(), 3);
    let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
    let now = Utc::now();
    scanner.scan(today, now).await.unwrap();

    provider.set_failing(true);
    let failed = outbox.drain(100, now).await.unwrap();
    assert_eq!(failed.retried, 1);

    provider.set_failing(false);
    let too_early = outbox.drain(100, now).await.unwrap();
    assert_eq!(too_early.attempted, 0);

    let later = outbox
        .drain(100, now + chrono::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(later.sent, 1);
}
