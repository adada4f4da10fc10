use super::PgStore;
use crate::models::{Academy, DirectoryFilter, PlanUsage};
use crate::services::metrics::db_timer;
use crate::services::store::AcademyStore;
use async_trait::async_trait;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

const ACADEMY_COLUMNS: &str = "academy_id, owner_id, name, slug, city, country, description, \
     contact_email, currency, is_public, created_utc, updated_utc";

#[async_trait]
impl AcademyStore for PgStore {
    #[instrument(skip(self, academy), fields(owner_id = %academy.owner_id, slug = %academy.slug))]
    async fn insert_academy(&self, academy: &Academy) -> Result<Academy, AppError> {
        let _timer = db_timer("insert_academy");

        let created = sqlx::query_as::<_, Academy>(&format!(
            r#"
            INSERT INTO academies (academy_id, owner_id, name, slug, city, country, description,
                contact_email, currency, is_public, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {ACADEMY_COLUMNS}
            "#
        ))
        .bind(academy.academy_id)
        .bind(academy.owner_id)
        .bind(&academy.name)
        .bind(&academy.slug)
        .bind(&academy.city)
        .bind(&academy.country)
        .bind(&academy.description)
        .bind(&academy.contact_email)
        .bind(&academy.currency)
        .bind(academy.is_public)
        .bind(academy.created_utc)
        .bind(academy.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to create academy", e))?;

        info!(academy_id = %created.academy_id, "Academy created");
        Ok(created)
    }

    async fn get_academy(&self, academy_id: Uuid) -> Result<Option<Academy>, AppError> {
        let pool = &self.pool;
        self.read("get_academy", move || async move {
            sqlx::query_as::<_, Academy>(&format!(
                "SELECT {ACADEMY_COLUMNS} FROM academies WHERE academy_id = $1"
            ))
            .bind(academy_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to get academy", e))
        })
        .await
    }

    async fn get_academy_by_slug(&self, slug: &str) -> Result<Option<Academy>, AppError> {
        let pool = &self.pool;
        self.read("get_academy_by_slug", move || async move {
            sqlx::query_as::<_, Academy>(&format!(
                "SELECT {ACADEMY_COLUMNS} FROM academies WHERE slug = $1"
            ))
            .bind(slug)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to get academy", e))
        })
        .await
    }

    async fn list_owned_academies(&self, owner_id: Uuid) -> Result<Vec<Academy>, AppError> {
        let pool = &self.pool;
        self.read("list_owned_academies", move || async move {
            sqlx::query_as::<_, Academy>(&format!(
                "SELECT {ACADEMY_COLUMNS} FROM academies WHERE owner_id = $1 ORDER BY created_utc"
            ))
            .bind(owner_id)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list academies", e))
        })
        .await
    }

    async fn list_all_academies(&self) -> Result<Vec<Academy>, AppError> {
        let pool = &self.pool;
        self.read("list_all_academies", move || async move {
            sqlx::query_as::<_, Academy>(&format!(
                "SELECT {ACADEMY_COLUMNS} FROM academies ORDER BY created_utc"
            ))
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list academies", e))
        })
        .await
    }

    #[instrument(skip(self, academy), fields(academy_id = %academy.academy_id))]
    async fn update_academy(&self, academy: &Academy) -> Result<Academy, AppError> {
        let _timer = db_timer("update_academy");

        sqlx::query_as::<_, Academy>(&format!(
            r#"
            UPDATE academies
            SET name = $2, slug = $3, city = $4, country = $5, description = $6,
                contact_email = $7, currency = $8, is_public = $9, updated_utc = $10
            WHERE academy_id = $1
            RETURNING {ACADEMY_COLUMNS}
            "#
        ))
        .bind(academy.academy_id)
        .bind(&academy.name)
        .bind(&academy.slug)
        .bind(&academy.city)
        .bind(&academy.country)
        .bind(&academy.description)
        .bind(&academy.contact_email)
        .bind(&academy.currency)
        .bind(academy.is_public)
        .bind(academy.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to update academy", e))
    }

    async fn list_public_academies(
        &self,
        filter: &DirectoryFilter,
    ) -> Result<(Vec<Academy>, i64), AppError> {
        let pool = &self.pool;
        let pattern = filter.query.as_ref().map(|q| format!("%{}%", q));
        let pattern = pattern.as_deref();
        let city = filter.city.as_deref();
        let (limit, offset) = (filter.limit, filter.offset);

        self.read("list_public_academies", move || async move {
            let total: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM academies
                WHERE is_public
                  AND ($1::text IS NULL OR LOWER(city) = LOWER($1))
                  AND ($2::text IS NULL OR name ILIKE $2 OR description ILIKE $2)
                "#,
            )
            .bind(city)
            .bind(pattern)
            .fetch_one(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to count academies", e))?;

            let academies = sqlx::query_as::<_, Academy>(&format!(
                r#"
                SELECT {ACADEMY_COLUMNS} FROM academies
                WHERE is_public
                  AND ($1::text IS NULL OR LOWER(city) = LOWER($1))
                  AND ($2::text IS NULL OR name ILIKE $2 OR description ILIKE $2)
                ORDER BY name
                LIMIT $3 OFFSET $4
                "#
            ))
            .bind(city)
            .bind(pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list academies", e))?;

            Ok::<_, AppError>((academies, total))
        })
        .await
    }

    async fn usage_for_owner(&self, owner_id: Uuid) -> Result<PlanUsage, AppError> {
        let pool = &self.pool;
        self.read("usage_for_owner", move || async move {
            let (academies, athletes, classes, groups): (i64, i64, i64, i64) = sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM academies a WHERE a.owner_id = $1),
                    (SELECT COUNT(*) FROM athletes t JOIN academies a USING (academy_id)
                        WHERE a.owner_id = $1 AND t.status = 'active'),
                    (SELECT COUNT(*) FROM classes c JOIN academies a USING (academy_id)
                        WHERE a.owner_id = $1 AND c.is_active),
                    (SELECT COUNT(*) FROM training_groups g JOIN academies a USING (academy_id)
                        WHERE a.owner_id = $1 AND g.is_active)
                "#,
            )
            .bind(owner_id)
            .fetch_one(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to count plan usage", e))?;

            Ok::<_, AppError>(PlanUsage {
                academies,
                athletes,
                classes,
                groups,
            })
        })
        .await
    }
}
