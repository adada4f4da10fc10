use super::PgStore;
use crate::models::{
    BillingItem, Charge, ChargeStatus, GeneratedChargeWrite, GenerationCandidate,
    ListChargesFilter,
};
use crate::services::metrics::db_timer;
use crate::services::store::BillingStore;
use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use service_core::retry::retry_with_backoff;
use tracing::{info, instrument};
use uuid::Uuid;

const BILLING_ITEM_COLUMNS: &str = "billing_item_id, academy_id, name, description, amount_cents, \
     currency, periodicity, is_active, created_utc, updated_utc";
const CHARGE_COLUMNS: &str = "charge_id, academy_id, athlete_id, group_id, billing_item_id, period, \
     description, amount_cents, amount_paid_cents, currency, due_date, status, payment_method, \
     paid_utc, origin, notes, processor_session_id, created_utc, updated_utc";

/// Charge row plus whether the upsert inserted it.
#[derive(sqlx::FromRow)]
struct UpsertedCharge {
    #[sqlx(flatten)]
    charge: Charge,
    inserted: bool,
}

#[async_trait]
impl BillingStore for PgStore {
    // =========================================================================
    // Billing items
    // =========================================================================

    #[instrument(skip(self, item), fields(academy_id = %item.academy_id))]
    async fn insert_billing_item(&self, item: &BillingItem) -> Result<BillingItem, AppError> {
        let _timer = db_timer("insert_billing_item");

        sqlx::query_as::<_, BillingItem>(&format!(
            r#"
            INSERT INTO billing_items (billing_item_id, academy_id, name, description,
                amount_cents, currency, periodicity, is_active, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {BILLING_ITEM_COLUMNS}
            "#
        ))
        .bind(item.billing_item_id)
        .bind(item.academy_id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.amount_cents)
        .bind(&item.currency)
        .bind(&item.periodicity)
        .bind(item.is_active)
        .bind(item.created_utc)
        .bind(item.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to create billing item", e))
    }

    async fn get_billing_item(
        &self,
        academy_id: Uuid,
        billing_item_id: Uuid,
    ) -> Result<Option<BillingItem>, AppError> {
        let pool = &self.pool;
        self.read("get_billing_item", move || async move {
            sqlx::query_as::<_, BillingItem>(&format!(
                "SELECT {BILLING_ITEM_COLUMNS} FROM billing_items WHERE academy_id = $1 AND billing_item_id = $2"
            ))
            .bind(academy_id)
            .bind(billing_item_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to get billing item", e))
        })
        .await
    }

    async fn list_billing_items(
        &self,
        academy_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<BillingItem>, AppError> {
        let pool = &self.pool;
        self.read("list_billing_items", move || async move {
            sqlx::query_as::<_, BillingItem>(&format!(
                r#"
                SELECT {BILLING_ITEM_COLUMNS} FROM billing_items
                WHERE academy_id = $1 AND ($2 OR is_active)
                ORDER BY name
                "#
            ))
            .bind(academy_id)
            .bind(include_inactive)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list billing items", e))
        })
        .await
    }

    #[instrument(skip(self, item), fields(billing_item_id = %item.billing_item_id))]
    async fn update_billing_item(&self, item: &BillingItem) -> Result<BillingItem, AppError> {
        let _timer = db_timer("update_billing_item");

        sqlx::query_as::<_, BillingItem>(&format!(
            r#"
            UPDATE billing_items
            SET name = $3, description = $4, amount_cents = $5, currency = $6,
                periodicity = $7, is_active = $8, updated_utc = $9
            WHERE academy_id = $1 AND billing_item_id = $2
            RETURNING {BILLING_ITEM_COLUMNS}
            "#
        ))
        .bind(item.academy_id)
        .bind(item.billing_item_id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.amount_cents)
        .bind(&item.currency)
        .bind(&item.periodicity)
        .bind(item.is_active)
        .bind(item.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to update billing item", e))
    }

    #[instrument(skip(self))]
    async fn delete_billing_item(
        &self,
        academy_id: Uuid,
        billing_item_id: Uuid,
    ) -> Result<bool, AppError> {
        let _timer = db_timer("delete_billing_item");

        let result =
            sqlx::query("DELETE FROM billing_items WHERE academy_id = $1 AND billing_item_id = $2")
                .bind(academy_id)
                .bind(billing_item_id)
                .execute(&self.pool)
                .await
                .map_err(|e| match AppError::from_sqlx("Failed to delete billing item", e) {
                    AppError::ForeignKeyViolation(_) => AppError::Conflict(anyhow::anyhow!(
                        "Billing item is referenced by charges; deactivate it instead"
                    )),
                    other => other,
                })?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Charges
    // =========================================================================

    #[instrument(skip(self, charge), fields(academy_id = %charge.academy_id, athlete_id = %charge.athlete_id))]
    async fn insert_charge(&self, charge: &Charge) -> Result<Charge, AppError> {
        let _timer = db_timer("insert_charge");

        let created = sqlx::query_as::<_, Charge>(&format!(
            r#"
            INSERT INTO charges ({CHARGE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING {CHARGE_COLUMNS}
            "#
        ))
        .bind(charge.charge_id)
        .bind(charge.academy_id)
        .bind(charge.athlete_id)
        .bind(charge.group_id)
        .bind(charge.billing_item_id)
        .bind(&charge.period)
        .bind(&charge.description)
        .bind(charge.amount_cents)
        .bind(charge.amount_paid_cents)
        .bind(&charge.currency)
        .bind(charge.due_date)
        .bind(&charge.status)
        .bind(&charge.payment_method)
        .bind(charge.paid_utc)
        .bind(&charge.origin)
        .bind(&charge.notes)
        .bind(&charge.processor_session_id)
        .bind(charge.created_utc)
        .bind(charge.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to create charge", e))?;

        info!(charge_id = %created.charge_id, amount_cents = created.amount_cents, "Charge created");
        Ok(created)
    }

    async fn get_charge(
        &self,
        academy_id: Uuid,
        charge_id: Uuid,
    ) -> Result<Option<Charge>, AppError> {
        let pool = &self.pool;
        self.read("get_charge", move || async move {
            sqlx::query_as::<_, Charge>(&format!(
                "SELECT {CHARGE_COLUMNS} FROM charges WHERE academy_id = $1 AND charge_id = $2"
            ))
            .bind(academy_id)
            .bind(charge_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to get charge", e))
        })
        .await
    }

    async fn find_charge(&self, charge_id: Uuid) -> Result<Option<Charge>, AppError> {
        let pool = &self.pool;
        self.read("find_charge", move || async move {
            sqlx::query_as::<_, Charge>(&format!(
                "SELECT {CHARGE_COLUMNS} FROM charges WHERE charge_id = $1"
            ))
            .bind(charge_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to get charge", e))
        })
        .await
    }

    async fn list_charges(
        &self,
        academy_id: Uuid,
        filter: &ListChargesFilter,
    ) -> Result<(Vec<Charge>, i64), AppError> {
        let pool = &self.pool;
        let period = filter.period.as_deref();
        let status = filter.status.map(|s| s.as_str());
        let (athlete_id, group_id) = (filter.athlete_id, filter.group_id);
        let (limit, offset) = (filter.limit, filter.offset);

        self.read("list_charges", move || async move {
            let total: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM charges
                WHERE academy_id = $1
                  AND ($2::text IS NULL OR period = $2)
                  AND ($3::text IS NULL OR status = $3)
                  AND ($4::uuid IS NULL OR athlete_id = $4)
                  AND ($5::uuid IS NULL OR group_id = $5)
                "#,
            )
            .bind(academy_id)
            .bind(period)
            .bind(status)
            .bind(athlete_id)
            .bind(group_id)
            .fetch_one(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to count charges", e))?;

            let charges = sqlx::query_as::<_, Charge>(&format!(
                r#"
                SELECT {CHARGE_COLUMNS} FROM charges
                WHERE academy_id = $1
                  AND ($2::text IS NULL OR period = $2)
                  AND ($3::text IS NULL OR status = $3)
                  AND ($4::uuid IS NULL OR athlete_id = $4)
                  AND ($5::uuid IS NULL OR group_id = $5)
                ORDER BY due_date DESC, created_utc DESC
                LIMIT $6 OFFSET $7
                "#
            ))
            .bind(academy_id)
            .bind(period)
            .bind(status)
            .bind(athlete_id)
            .bind(group_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list charges", e))?;

            Ok::<_, AppError>((charges, total))
        })
        .await
    }

    #[instrument(skip(self, charge), fields(charge_id = %charge.charge_id, status = %charge.status))]
    async fn update_charge(&self, charge: &Charge) -> Result<Charge, AppError> {
        let _timer = db_timer("update_charge");

        sqlx::query_as::<_, Charge>(&format!(
            r#"
            UPDATE charges
            SET description = $3, amount_cents = $4, amount_paid_cents = $5, due_date = $6,
                status = $7, payment_method = $8, paid_utc = $9, notes = $10,
                processor_session_id = $11, billing_item_id = $12, updated_utc = $13
            WHERE academy_id = $1 AND charge_id = $2
            RETURNING {CHARGE_COLUMNS}
            "#
        ))
        .bind(charge.academy_id)
        .bind(charge.charge_id)
        .bind(&charge.description)
        .bind(charge.amount_cents)
        .bind(charge.amount_paid_cents)
        .bind(charge.due_date)
        .bind(&charge.status)
        .bind(&charge.payment_method)
        .bind(charge.paid_utc)
        .bind(&charge.notes)
        .bind(&charge.processor_session_id)
        .bind(charge.billing_item_id)
        .bind(charge.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to update charge", e))
    }

    #[instrument(skip(self))]
    async fn delete_charge(&self, academy_id: Uuid, charge_id: Uuid) -> Result<bool, AppError> {
        let _timer = db_timer("delete_charge");

        let result = sqlx::query("DELETE FROM charges WHERE academy_id = $1 AND charge_id = $2")
            .bind(academy_id)
            .bind(charge_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to delete charge", e))?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Generation
    // =========================================================================

    async fn generation_candidates(
        &self,
        academy_id: Uuid,
        group_id: Option<Uuid>,
    ) -> Result<Vec<GenerationCandidate>, AppError> {
        let pool = &self.pool;
        self.read("generation_candidates", move || async move {
            sqlx::query_as::<_, GenerationCandidate>(
                r#"
                SELECT a.athlete_id, a.first_name, a.last_name,
                    g.group_id, g.name AS group_name,
                    m.custom_fee_cents, g.monthly_fee_cents AS group_fee_cents,
                    g.billing_item_id,
                    bi.amount_cents AS item_amount_cents,
                    bi.currency AS item_currency,
                    bi.is_active AS item_is_active
                FROM group_memberships m
                JOIN training_groups g ON g.group_id = m.group_id
                JOIN athletes a ON a.athlete_id = m.athlete_id
                LEFT JOIN billing_items bi ON bi.billing_item_id = g.billing_item_id
                WHERE g.academy_id = $1
                  AND ($2::uuid IS NULL OR g.group_id = $2)
                  AND m.is_active AND g.is_active AND a.status = 'active'
                ORDER BY g.name, a.last_name, a.first_name
                "#,
            )
            .bind(academy_id)
            .bind(group_id)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to load generation candidates", e))
        })
        .await
    }

    async fn list_period_charges(
        &self,
        academy_id: Uuid,
        period: &str,
    ) -> Result<Vec<Charge>, AppError> {
        let pool = &self.pool;
        self.read("list_period_charges", move || async move {
            sqlx::query_as::<_, Charge>(&format!(
                r#"
                SELECT {CHARGE_COLUMNS} FROM charges
                WHERE academy_id = $1 AND period = $2
                ORDER BY created_utc
                "#
            ))
            .bind(academy_id)
            .bind(period)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list period charges", e))
        })
        .await
    }

    #[instrument(skip(self, charge), fields(athlete_id = %charge.athlete_id, period = %charge.period))]
    async fn write_generated_charge(
        &self,
        charge: &Charge,
        overwrite_pending: bool,
    ) -> Result<GeneratedChargeWrite, AppError> {
        let _timer = db_timer("write_generated_charge");

        // The partial unique index uq_charges_generated is the conflict target.
        // xmax = 0 only for freshly inserted tuples.
        let on_conflict = if overwrite_pending {
            format!(
                r#"
                DO UPDATE SET amount_cents = EXCLUDED.amount_cents,
                    currency = EXCLUDED.currency,
                    due_date = EXCLUDED.due_date,
                    description = EXCLUDED.description,
                    billing_item_id = EXCLUDED.billing_item_id,
                    updated_utc = EXCLUDED.updated_utc
                WHERE charges.status = '{}'
                "#,
                ChargeStatus::Pending.as_str()
            )
        } else {
            "DO NOTHING".to_string()
        };

        let sql = format!(
            r#"
            INSERT INTO charges ({CHARGE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            ON CONFLICT (academy_id, athlete_id, period, group_id) WHERE origin = 'generated'
            {on_conflict}
            RETURNING {CHARGE_COLUMNS}, (xmax = 0) AS inserted
            "#
        );

        let pool = &self.pool;
        let sql = sql.as_str();
        let row = retry_with_backoff(&self.retry, "write_generated_charge", move || async move {
            sqlx::query_as::<_, UpsertedCharge>(sql)
                .bind(charge.charge_id)
                .bind(charge.academy_id)
                .bind(charge.athlete_id)
                .bind(charge.group_id)
                .bind(charge.billing_item_id)
                .bind(&charge.period)
                .bind(&charge.description)
                .bind(charge.amount_cents)
                .bind(charge.amount_paid_cents)
                .bind(&charge.currency)
                .bind(charge.due_date)
                .bind(&charge.status)
                .bind(&charge.payment_method)
                .bind(charge.paid_utc)
                .bind(&charge.origin)
                .bind(&charge.notes)
                .bind(&charge.processor_session_id)
                .bind(charge.created_utc)
                .bind(charge.updated_utc)
                .fetch_optional(pool)
                .await
                .map_err(|e| AppError::from_sqlx("Failed to write generated charge", e))
        })
        .await?;

        Ok(match row {
            Some(UpsertedCharge {
                charge,
                inserted: true,
            }) => GeneratedChargeWrite::Created(charge),
            Some(UpsertedCharge { charge, .. }) => GeneratedChargeWrite::Updated(charge),
            None => GeneratedChargeWrite::Skipped,
        })
    }

    async fn list_open_charges_due_by(
        &self,
        academy_id: Uuid,
        until: NaiveDate,
    ) -> Result<Vec<Charge>, AppError> {
        let pool = &self.pool;
        self.read("list_open_charges_due_by", move || async move {
            sqlx::query_as::<_, Charge>(&format!(
                r#"
                SELECT {CHARGE_COLUMNS} FROM charges
                WHERE academy_id = $1
                  AND status IN ('pending', 'partial', 'overdue')
                  AND due_date <= $2
                ORDER BY due_date
                "#
            ))
            .bind(academy_id)
            .bind(until)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list open charges", e))
        })
        .await
    }

    async fn list_unpaid_past_due(&self, today: NaiveDate) -> Result<Vec<Charge>, AppError> {
        let pool = &self.pool;
        self.read("list_unpaid_past_due", move || async move {
            sqlx::query_as::<_, Charge>(&format!(
                r#"
                SELECT {CHARGE_COLUMNS} FROM charges
                WHERE status IN ('pending', 'partial') AND due_date < $1
                ORDER BY due_date
                "#
            ))
            .bind(today)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list past due charges", e))
        })
        .await
    }
}
