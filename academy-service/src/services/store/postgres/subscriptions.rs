use super::PgStore;
use crate::models::{Notification, ProcessorInvoice, Subscription};
use crate::services::metrics::db_timer;
use crate::services::store::SubscriptionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

const SUBSCRIPTION_COLUMNS: &str = "subscription_id, owner_id, plan_code, status, \
     processor_customer_id, processor_subscription_id, current_period_end, \
     cancel_at_period_end, created_utc, updated_utc";
const INVOICE_COLUMNS: &str = "invoice_id, owner_id, processor_invoice_id, amount_cents, currency, \
     status, hosted_invoice_url, period_end, created_utc";
const NOTIFICATION_COLUMNS: &str =
    "notification_id, owner_id, kind, title, body, metadata, read_utc, created_utc";

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn get_subscription(&self, owner_id: Uuid) -> Result<Option<Subscription>, AppError> {
        let pool = &self.pool;
        self.read("get_subscription", move || async move {
            sqlx::query_as::<_, Subscription>(&format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE owner_id = $1"
            ))
            .bind(owner_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to get subscription", e))
        })
        .await
    }

    async fn find_subscription_by_processor_id(
        &self,
        processor_subscription_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let pool = &self.pool;
        self.read("find_subscription_by_processor_id", move || async move {
            sqlx::query_as::<_, Subscription>(&format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE processor_subscription_id = $1"
            ))
            .bind(processor_subscription_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to get subscription", e))
        })
        .await
    }

    async fn find_subscription_by_customer(
        &self,
        processor_customer_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let pool = &self.pool;
        self.read("find_subscription_by_customer", move || async move {
            sqlx::query_as::<_, Subscription>(&format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE processor_customer_id = $1"
            ))
            .bind(processor_customer_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to get subscription", e))
        })
        .await
    }

    #[instrument(skip(self, subscription), fields(owner_id = %subscription.owner_id, plan_code = %subscription.plan_code))]
    async fn upsert_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription, AppError> {
        let _timer = db_timer("upsert_subscription");

        let saved = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO subscriptions ({SUBSCRIPTION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (owner_id) DO UPDATE SET
                plan_code = EXCLUDED.plan_code,
                status = EXCLUDED.status,
                processor_customer_id = EXCLUDED.processor_customer_id,
                processor_subscription_id = EXCLUDED.processor_subscription_id,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                updated_utc = EXCLUDED.updated_utc
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription.subscription_id)
        .bind(subscription.owner_id)
        .bind(&subscription.plan_code)
        .bind(&subscription.status)
        .bind(&subscription.processor_customer_id)
        .bind(&subscription.processor_subscription_id)
        .bind(subscription.current_period_end)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.created_utc)
        .bind(subscription.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to save subscription", e))?;

        info!(subscription_id = %saved.subscription_id, status = %saved.status, "Subscription saved");
        Ok(saved)
    }

    #[instrument(skip(self, invoice), fields(processor_invoice_id = %invoice.processor_invoice_id))]
    async fn upsert_processor_invoice(
        &self,
        invoice: &ProcessorInvoice,
    ) -> Result<ProcessorInvoice, AppError> {
        let _timer = db_timer("upsert_processor_invoice");

        sqlx::query_as::<_, ProcessorInvoice>(&format!(
            r#"
            INSERT INTO processor_invoices ({INVOICE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (processor_invoice_id) DO UPDATE SET
                amount_cents = EXCLUDED.amount_cents,
                currency = EXCLUDED.currency,
                status = EXCLUDED.status,
                hosted_invoice_url = EXCLUDED.hosted_invoice_url,
                period_end = EXCLUDED.period_end
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(invoice.invoice_id)
        .bind(invoice.owner_id)
        .bind(&invoice.processor_invoice_id)
        .bind(invoice.amount_cents)
        .bind(&invoice.currency)
        .bind(&invoice.status)
        .bind(&invoice.hosted_invoice_url)
        .bind(invoice.period_end)
        .bind(invoice.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to save processor invoice", e))
    }

    async fn list_processor_invoices(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<ProcessorInvoice>, AppError> {
        let pool = &self.pool;
        self.read("list_processor_invoices", move || async move {
            sqlx::query_as::<_, ProcessorInvoice>(&format!(
                "SELECT {INVOICE_COLUMNS} FROM processor_invoices WHERE owner_id = $1 ORDER BY created_utc DESC"
            ))
            .bind(owner_id)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list processor invoices", e))
        })
        .await
    }

    #[instrument(skip(self, notification), fields(owner_id = %notification.owner_id, kind = %notification.kind))]
    async fn insert_notification(
        &self,
        notification: &Notification,
    ) -> Result<Notification, AppError> {
        let _timer = db_timer("insert_notification");

        sqlx::query_as::<_, Notification>(&format!(
            r#"
            INSERT INTO notifications ({NOTIFICATION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(notification.notification_id)
        .bind(notification.owner_id)
        .bind(&notification.kind)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.metadata)
        .bind(notification.read_utc)
        .bind(notification.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to create notification", e))
    }

    async fn list_notifications(
        &self,
        owner_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<Notification>, AppError> {
        let pool = &self.pool;
        self.read("list_notifications", move || async move {
            sqlx::query_as::<_, Notification>(&format!(
                r#"
                SELECT {NOTIFICATION_COLUMNS} FROM notifications
                WHERE owner_id = $1 AND (NOT $2 OR read_utc IS NULL)
                ORDER BY created_utc DESC
                "#
            ))
            .bind(owner_id)
            .bind(unread_only)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list notifications", e))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn mark_notification_read(
        &self,
        owner_id: Uuid,
        notification_id: Uuid,
        read_utc: DateTime<Utc>,
    ) -> Result<Option<Notification>, AppError> {
        let _timer = db_timer("mark_notification_read");

        sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications
            SET read_utc = COALESCE(read_utc, $3)
            WHERE owner_id = $1 AND notification_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(owner_id)
        .bind(notification_id)
        .bind(read_utc)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to update notification", e))
    }
}
