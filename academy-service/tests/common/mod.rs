#![allow(dead_code)]

use academy_service::config::{
    AcademyConfig, BillingConfig, DatabaseConfig, PaymentsConfig, SmtpConfig, StoreBackend,
};
use academy_service::models::PlanCode;
use academy_service::services::payments::webhook::{sign_payload, SIGNATURE_HEADER};
use academy_service::services::payments::MockPaymentProcessor;
use academy_service::services::{MemoryStore, PgStore, Store};
use academy_service::startup::Application;
use reqwest::{Method, RequestBuilder, Response};
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

static SCHEMA_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Postgres tests run only when `TEST_DATABASE_URL` is set.
pub fn test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok()
}

fn unique_schema_name() -> String {
    let counter = SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("test_academy_{}_{}", std::process::id(), counter)
}

pub fn test_config() -> AcademyConfig {
    let mut price_ids = HashMap::new();
    price_ids.insert(PlanCode::Pro, "price_pro_test".to_string());

    AcademyConfig {
        common: CoreConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
        },
        service_name: "academy-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        store: StoreBackend::Memory,
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 0,
        },
        billing: BillingConfig::default(),
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 1025,
            user: String::new(),
            password: Secret::new(String::new()),
            from_email: "noreply@example.com".to_string(),
            from_name: "Academy".to_string(),
            enabled: false,
        },
        payments: PaymentsConfig {
            secret_key: None,
            webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            api_base_url: "http://127.0.0.1:9".to_string(),
            price_ids,
        },
        app_base_url: "http://app.test".to_string(),
        rate_limit_per_minute: 10_000,
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: Arc<dyn Store>,
    pub client: reqwest::Client,
    schema_name: Option<String>,
}

impl TestApp {
    /// In-memory store.
    pub async fn spawn() -> Self {
        Self::spawn_with(Arc::new(MemoryStore::new()), None).await
    }

    /// PostgreSQL store in a fresh schema, or `None` without `TEST_DATABASE_URL`.
    pub async fn spawn_postgres() -> Option<Self> {
        let base_url = test_database_url()?;
        let schema_name = unique_schema_name();

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&base_url)
            .await
            .expect("Failed to connect to test database");
        sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema_name))
            .execute(&pool)
            .await
            .ok();
        sqlx::query(&format!("CREATE SCHEMA {}", schema_name))
            .execute(&pool)
            .await
            .expect("Failed to create test schema");
        pool.close().await;

        let separator = if base_url.contains('?') { "&" } else { "?" };
        let url = format!(
            "{}{}options=-c search_path%3D{}",
            base_url, separator, schema_name
        );
        let store = PgStore::connect(&url, 5, 1)
            .await
            .expect("Failed to connect test store");
        store
            .run_migrations()
            .await
            .expect("Failed to run migrations");

        Some(Self::spawn_with(Arc::new(store), Some(schema_name)).await)
    }

    async fn spawn_with(store: Arc<dyn Store>, schema_name: Option<String>) -> Self {
        let app = Application::build_with(
            test_config(),
            store.clone(),
            Arc::new(MockPaymentProcessor::new()),
        )
        .await
        .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client
                .get(format!("{}/health", address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            port,
            store,
            client,
            schema_name,
        }
    }

    /// Drop the Postgres schema, if any.
    pub async fn cleanup(&self) {
        let (Some(schema_name), Some(base_url)) = (&self.schema_name, test_database_url()) else {
            return;
        };
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&base_url)
            .await
            .ok();
        if let Some(pool) = pool {
            let _ = sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema_name))
                .execute(&pool)
                .await;
            pool.close().await;
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Request identified as `user_id`.
    pub fn as_user(&self, method: Method, path: &str, user_id: Uuid) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("X-User-ID", user_id.to_string())
    }

    /// Request identified as `user_id`, scoped to `academy_id`.
    pub fn in_academy(
        &self,
        method: Method,
        path: &str,
        user_id: Uuid,
        academy_id: Uuid,
    ) -> RequestBuilder {
        self.as_user(method, path, user_id)
            .header("X-Academy-ID", academy_id.to_string())
    }

    pub async fn create_academy(&self, owner_id: Uuid, name: &str) -> Uuid {
        let response = self
            .as_user(Method::POST, "/api/academies", owner_id)
            .json(&json!({ "name": name, "city": "Valencia", "is_public": true }))
            .send()
            .await
            .expect("Failed to create academy");
        assert_eq!(response.status(), 201, "academy creation failed");
        id_of(response, "academy_id").await
    }

    /// POST inside the academy, asserting 201, returning the `id_field` of the body.
    pub async fn create_in(
        &self,
        owner_id: Uuid,
        academy_id: Uuid,
        path: &str,
        body: Value,
        id_field: &str,
    ) -> Uuid {
        let response = self
            .in_academy(Method::POST, path, owner_id, academy_id)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status(), 201, "POST {} failed", path);
        id_of(response, id_field).await
    }

    pub async fn create_athlete(&self, owner_id: Uuid, academy_id: Uuid, first_name: &str) -> Uuid {
        self.create_in(
            owner_id,
            academy_id,
            "/api/athletes",
            json!({ "first_name": first_name, "last_name": "Test" }),
            "athlete_id",
        )
        .await
    }

    pub async fn send_webhook(&self, payload: &Value) -> Response {
        let body = payload.to_string();
        let signature = sign_payload(WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &body)
            .expect("Failed to sign payload");
        self.client
            .post(self.url("/webhooks/payments"))
            .header(SIGNATURE_HEADER, signature)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("Failed to send webhook")
    }
}

pub async fn id_of(response: Response, field: &str) -> Uuid {
    let body: Value = response.json().await.expect("Failed to parse response");
    body[field]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(|| panic!("missing {} in {}", field, body))
}
