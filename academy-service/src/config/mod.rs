//! Configuration module for academy-service.

use crate::models::PlanCode;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct AcademyConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreBackend,
    pub database: DatabaseConfig,
    pub billing: BillingConfig,
    pub smtp: SmtpConfig,
    pub payments: PaymentsConfig,
    pub app_base_url: String,
    pub rate_limit_per_minute: u32,
}

/// Which store implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown STORE_BACKEND '{}', expected postgres or memory",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Day of month charges fall due when a request gives none.
    pub default_due_day: u32,
    pub reminder_days_before: i64,
    pub email_max_attempts: i32,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    /// No key means the mock processor is used.
    pub secret_key: Option<Secret<String>>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
    /// Processor price id per paid plan.
    pub price_ids: HashMap<PlanCode, String>,
}

impl PaymentsConfig {
    pub fn price_id(&self, plan: PlanCode) -> Option<&str> {
        self.price_ids.get(&plan).map(String::as_str)
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_due_day: 5,
            reminder_days_before: 3,
            email_max_attempts: 5,
        }
    }
}

impl AcademyConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let store: StoreBackend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let database_url = match store {
            StoreBackend::Postgres => env::var("DATABASE_URL").map_err(|_| {
                AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
            })?,
            StoreBackend::Memory => env::var("DATABASE_URL").unwrap_or_default(),
        };

        let defaults = BillingConfig::default();
        let default_due_day = parse_env("DEFAULT_DUE_DAY", defaults.default_due_day);
        if !(1..=28).contains(&default_due_day) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DEFAULT_DUE_DAY must be between 1 and 28, got {}",
                default_due_day
            )));
        }

        let price_ids = PlanCode::ALL
            .iter()
            .filter_map(|plan| {
                let key = format!("STRIPE_PRICE_{}", plan.as_str().to_uppercase());
                env::var(key)
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(|price| (*plan, price))
            })
            .collect();

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "academy-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            store,
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 2),
            },
            billing: BillingConfig {
                default_due_day,
                reminder_days_before: parse_env(
                    "REMINDER_DAYS_BEFORE",
                    defaults.reminder_days_before,
                ),
                email_max_attempts: parse_env("EMAIL_MAX_ATTEMPTS", defaults.email_max_attempts),
            },
            smtp: SmtpConfig {
                host: env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: parse_env("SMTP_PORT", 587),
                user: env::var("SMTP_USER").unwrap_or_default(),
                password: Secret::new(env::var("SMTP_PASSWORD").unwrap_or_default()),
                from_email: env::var("SMTP_FROM_EMAIL")
                    .unwrap_or_else(|_| "noreply@example.com".to_string()),
                from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Academy".to_string()),
                enabled: parse_env("SMTP_ENABLED", false),
            },
            payments: PaymentsConfig {
                secret_key: env::var("STRIPE_SECRET_KEY")
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(Secret::new),
                webhook_secret: Secret::new(env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default()),
                api_base_url: env::var("STRIPE_API_BASE_URL")
                    .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
                price_ids,
            },
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            rate_limit_per_minute: parse_env("RATE_LIMIT_PER_MINUTE", 120),
        })
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
