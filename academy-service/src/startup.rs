use crate::config::{AcademyConfig, StoreBackend};
use crate::handlers::{
    academies, athletes, billing_items, charges, classes, directory, groups, guardians,
    health_check, metrics_endpoint, readiness_check, subscription, webhooks,
};
use crate::services::email::{EmailProvider, MockEmailProvider, SmtpProvider};
use crate::services::payments::{MockPaymentProcessor, PaymentProcessor, StripeClient};
use crate::services::{MemoryStore, PgStore, Store};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AcademyConfig>,
    pub store: Arc<dyn Store>,
    pub processor: Arc<dyn PaymentProcessor>,
}

/// The store selected by `STORE_BACKEND`. Postgres is migrated on connect.
pub async fn connect_store(config: &AcademyConfig) -> Result<Arc<dyn Store>, AppError> {
    match config.store {
        StoreBackend::Postgres => {
            let store = PgStore::connect(
                &config.database.url,
                config.database.max_connections,
                config.database.min_connections,
            )
            .await?;
            store.run_migrations().await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Stripe when a secret key is configured, the mock processor otherwise.
pub fn payment_processor(config: &AcademyConfig) -> Result<Arc<dyn PaymentProcessor>, AppError> {
    match &config.payments.secret_key {
        Some(key) => Ok(Arc::new(StripeClient::new(
            key.clone(),
            config.payments.api_base_url.clone(),
        )?)),
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set, using the mock payment processor");
            Ok(Arc::new(MockPaymentProcessor::new()))
        }
    }
}

/// SMTP when enabled, the mock provider otherwise.
pub fn email_provider(config: &AcademyConfig) -> Result<Arc<dyn EmailProvider>, AppError> {
    if config.smtp.enabled {
        Ok(Arc::new(SmtpProvider::new(config.smtp.clone())?))
    } else {
        tracing::warn!("SMTP disabled, emails go to the mock provider");
        Ok(Arc::new(MockEmailProvider::new()))
    }
}

pub fn build_router(state: AppState) -> Router {
    let limiter = create_ip_rate_limiter(state.config.rate_limit_per_minute);

    let unauthenticated = Router::new()
        .route("/public/academies", get(directory::list_public_academies))
        .route("/public/academies/:slug", get(directory::get_public_academy))
        .route("/webhooks/payments", post(webhooks::payment_webhook))
        .layer(from_fn_with_state(limiter, ip_rate_limit_middleware));

    let api = Router::new()
        .route(
            "/api/academies",
            post(academies::create_academy).get(academies::list_academies),
        )
        .route(
            "/api/academy",
            get(academies::get_current_academy).patch(academies::update_current_academy),
        )
        .route(
            "/api/athletes",
            get(athletes::list_athletes).post(athletes::create_athlete),
        )
        .route(
            "/api/athletes/:id",
            get(athletes::get_athlete)
                .patch(athletes::update_athlete)
                .delete(athletes::delete_athlete),
        )
        .route(
            "/api/athletes/:id/guardians",
            get(athletes::list_athlete_guardians).post(athletes::link_guardian),
        )
        .route(
            "/api/athletes/:id/guardians/:guardian_id",
            axum::routing::delete(athletes::unlink_guardian),
        )
        .route(
            "/api/guardians",
            get(guardians::list_guardians).post(guardians::create_guardian),
        )
        .route(
            "/api/guardians/:id",
            get(guardians::get_guardian)
                .patch(guardians::update_guardian)
                .delete(guardians::delete_guardian),
        )
        .route(
            "/api/groups",
            get(groups::list_groups).post(groups::create_group),
        )
        .route(
            "/api/groups/:id",
            get(groups::get_group)
                .patch(groups::update_group)
                .delete(groups::delete_group),
        )
        .route(
            "/api/groups/:id/members",
            get(groups::list_members).post(groups::add_member),
        )
        .route(
            "/api/groups/:id/members/:athlete_id",
            patch(groups::update_member).delete(groups::remove_member),
        )
        .route(
            "/api/classes",
            get(classes::list_classes).post(classes::create_class),
        )
        .route(
            "/api/classes/:id",
            get(classes::get_class)
                .patch(classes::update_class)
                .delete(classes::delete_class),
        )
        .route(
            "/api/classes/:id/attendance",
            get(classes::list_attendance).post(classes::record_attendance),
        )
        .route(
            "/api/billing-items",
            get(billing_items::list_billing_items).post(billing_items::create_billing_item),
        )
        .route(
            "/api/billing-items/:id",
            get(billing_items::get_billing_item)
                .patch(billing_items::update_billing_item)
                .delete(billing_items::delete_billing_item),
        )
        .route(
            "/api/charges",
            get(charges::list_charges).post(charges::create_charge),
        )
        .route("/api/charges/generate", post(charges::generate_charges))
        .route(
            "/api/charges/:id",
            get(charges::get_charge)
                .patch(charges::update_charge)
                .delete(charges::delete_charge),
        )
        .route("/api/charges/:id/pay", post(charges::pay_charge))
        .route("/api/charges/:id/checkout", post(charges::checkout_charge))
        .route("/api/subscription", get(subscription::get_subscription))
        .route("/api/subscription/plan", post(subscription::change_plan))
        .route(
            "/api/subscription/checkout",
            post(subscription::create_checkout),
        )
        .route("/api/subscription/portal", post(subscription::create_portal))
        .route(
            "/api/subscription/invoices",
            get(subscription::list_invoices),
        )
        .route(
            "/api/notifications",
            get(subscription::list_notifications),
        )
        .route(
            "/api/notifications/:id/read",
            post(subscription::mark_notification_read),
        );

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .merge(unauthenticated)
        .merge(api)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                    academy_id = tracing::field::Empty,
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(CorsLayer::permissive())
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    state: AppState,
}

impl Application {
    pub async fn build(config: AcademyConfig) -> Result<Self, AppError> {
        let store = connect_store(&config).await?;
        let processor = payment_processor(&config)?;
        Self::build_with(config, store, processor).await
    }

    /// Build around already constructed collaborators.
    pub async fn build_with(
        config: AcademyConfig,
        store: Arc<dyn Store>,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let state = AppState {
            config: Arc::new(config),
            store,
            processor,
        };

        let app = build_router(state.clone());

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port = port,
            store = state.store.backend_name(),
            processor = state.processor.name(),
            "Listening"
        );

        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        );

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            state,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
