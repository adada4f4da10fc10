use super::PgStore;
use crate::models::{
    Athlete, AttendanceRecord, Class, Group, GroupMembership, Guardian, ListAthletesFilter,
};
use crate::services::metrics::db_timer;
use crate::services::store::RosterStore;
use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use tracing::instrument;
use uuid::Uuid;

const ATHLETE_COLUMNS: &str = "athlete_id, academy_id, first_name, last_name, birth_date, level, \
     status, notes, created_utc, updated_utc";
const GUARDIAN_COLUMNS: &str =
    "guardian_id, academy_id, full_name, email, phone, relationship, created_utc";
const GROUP_COLUMNS: &str = "group_id, academy_id, name, description, monthly_fee_cents, \
     billing_item_id, is_active, created_utc, updated_utc";
const MEMBERSHIP_COLUMNS: &str = "group_id, athlete_id, custom_fee_cents, is_active, joined_utc";
const CLASS_COLUMNS: &str = "class_id, academy_id, group_id, name, weekday, start_time, \
     duration_minutes, coach_name, is_active, created_utc";
const ATTENDANCE_COLUMNS: &str =
    "attendance_id, class_id, athlete_id, session_date, status, recorded_utc";

#[async_trait]
impl RosterStore for PgStore {
    // =========================================================================
    // Athletes
    // =========================================================================

    #[instrument(skip(self, athlete), fields(academy_id = %athlete.academy_id))]
    async fn insert_athlete(&self, athlete: &Athlete) -> Result<Athlete, AppError> {
        let _timer = db_timer("insert_athlete");

        sqlx::query_as::<_, Athlete>(&format!(
            r#"
            INSERT INTO athletes (athlete_id, academy_id, first_name, last_name, birth_date,
                level, status, notes, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ATHLETE_COLUMNS}
            "#
        ))
        .bind(athlete.athlete_id)
        .bind(athlete.academy_id)
        .bind(&athlete.first_name)
        .bind(&athlete.last_name)
        .bind(athlete.birth_date)
        .bind(&athlete.level)
        .bind(&athlete.status)
        .bind(&athlete.notes)
        .bind(athlete.created_utc)
        .bind(athlete.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to create athlete", e))
    }

    async fn get_athlete(
        &self,
        academy_id: Uuid,
        athlete_id: Uuid,
    ) -> Result<Option<Athlete>, AppError> {
        let pool = &self.pool;
        self.read("get_athlete", move || async move {
            sqlx::query_as::<_, Athlete>(&format!(
                "SELECT {ATHLETE_COLUMNS} FROM athletes WHERE academy_id = $1 AND athlete_id = $2"
            ))
            .bind(academy_id)
            .bind(athlete_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to get athlete", e))
        })
        .await
    }

    async fn list_athletes(
        &self,
        academy_id: Uuid,
        filter: &ListAthletesFilter,
    ) -> Result<(Vec<Athlete>, i64), AppError> {
        let pool = &self.pool;
        let status = filter.status.map(|s| s.as_str());
        let pattern = filter.query.as_ref().map(|q| format!("%{}%", q));
        let pattern = pattern.as_deref();
        let (limit, offset) = (filter.limit, filter.offset);

        self.read("list_athletes", move || async move {
            let total: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM athletes
                WHERE academy_id = $1
                  AND ($2::text IS NULL OR status = $2)
                  AND ($3::text IS NULL OR first_name ILIKE $3 OR last_name ILIKE $3)
                "#,
            )
            .bind(academy_id)
            .bind(status)
            .bind(pattern)
            .fetch_one(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to count athletes", e))?;

            let athletes = sqlx::query_as::<_, Athlete>(&format!(
                r#"
                SELECT {ATHLETE_COLUMNS} FROM athletes
                WHERE academy_id = $1
                  AND ($2::text IS NULL OR status = $2)
                  AND ($3::text IS NULL OR first_name ILIKE $3 OR last_name ILIKE $3)
                ORDER BY last_name, first_name
                LIMIT $4 OFFSET $5
                "#
            ))
            .bind(academy_id)
            .bind(status)
            .bind(pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list athletes", e))?;

            Ok::<_, AppError>((athletes, total))
        })
        .await
    }

    #[instrument(skip(self, athlete), fields(athlete_id = %athlete.athlete_id))]
    async fn update_athlete(&self, athlete: &Athlete) -> Result<Athlete, AppError> {
        let _timer = db_timer("update_athlete");

        sqlx::query_as::<_, Athlete>(&format!(
            r#"
            UPDATE athletes
            SET first_name = $3, last_name = $4, birth_date = $5, level = $6, status = $7,
                notes = $8, updated_utc = $9
            WHERE academy_id = $1 AND athlete_id = $2
            RETURNING {ATHLETE_COLUMNS}
            "#
        ))
        .bind(athlete.academy_id)
        .bind(athlete.athlete_id)
        .bind(&athlete.first_name)
        .bind(&athlete.last_name)
        .bind(athlete.birth_date)
        .bind(&athlete.level)
        .bind(&athlete.status)
        .bind(&athlete.notes)
        .bind(athlete.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to update athlete", e))
    }

    // =========================================================================
    // Guardians
    // =========================================================================

    #[instrument(skip(self, guardian), fields(academy_id = %guardian.academy_id))]
    async fn insert_guardian(&self, guardian: &Guardian) -> Result<Guardian, AppError> {
        let _timer = db_timer("insert_guardian");

        sqlx::query_as::<_, Guardian>(&format!(
            r#"
            INSERT INTO guardians (guardian_id, academy_id, full_name, email, phone,
                relationship, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {GUARDIAN_COLUMNS}
            "#
        ))
        .bind(guardian.guardian_id)
        .bind(guardian.academy_id)
        .bind(&guardian.full_name)
        .bind(&guardian.email)
        .bind(&guardian.phone)
        .bind(&guardian.relationship)
        .bind(guardian.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to create guardian", e))
    }

    async fn get_guardian(
        &self,
        academy_id: Uuid,
        guardian_id: Uuid,
    ) -> Result<Option<Guardian>, AppError> {
        let pool = &self.pool;
        self.read("get_guardian", move || async move {
            sqlx::query_as::<_, Guardian>(&format!(
                "SELECT {GUARDIAN_COLUMNS} FROM guardians WHERE academy_id = $1 AND guardian_id = $2"
            ))
            .bind(academy_id)
            .bind(guardian_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to get guardian", e))
        })
        .await
    }

    async fn list_guardians(
        &self,
        academy_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Guardian>, i64), AppError> {
        let pool = &self.pool;
        self.read("list_guardians", move || async move {
            let total: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM guardians WHERE academy_id = $1")
                    .bind(academy_id)
                    .fetch_one(pool)
                    .await
                    .map_err(|e| AppError::from_sqlx("Failed to count guardians", e))?;

            let guardians = sqlx::query_as::<_, Guardian>(&format!(
                r#"
                SELECT {GUARDIAN_COLUMNS} FROM guardians
                WHERE academy_id = $1
                ORDER BY full_name
                LIMIT $2 OFFSET $3
                "#
            ))
            .bind(academy_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list guardians", e))?;

            Ok::<_, AppError>((guardians, total))
        })
        .await
    }

    #[instrument(skip(self, guardian), fields(guardian_id = %guardian.guardian_id))]
    async fn update_guardian(&self, guardian: &Guardian) -> Result<Guardian, AppError> {
        let _timer = db_timer("update_guardian");

        sqlx::query_as::<_, Guardian>(&format!(
            r#"
            UPDATE guardians
            SET full_name = $3, email = $4, phone = $5, relationship = $6
            WHERE academy_id = $1 AND guardian_id = $2
            RETURNING {GUARDIAN_COLUMNS}
            "#
        ))
        .bind(guardian.academy_id)
        .bind(guardian.guardian_id)
        .bind(&guardian.full_name)
        .bind(&guardian.email)
        .bind(&guardian.phone)
        .bind(&guardian.relationship)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to update guardian", e))
    }

    #[instrument(skip(self))]
    async fn delete_guardian(&self, academy_id: Uuid, guardian_id: Uuid) -> Result<bool, AppError> {
        let _timer = db_timer("delete_guardian");

        // athlete_guardians rows go with it (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM guardians WHERE academy_id = $1 AND guardian_id = $2")
            .bind(academy_id)
            .bind(guardian_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to delete guardian", e))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn link_guardian(&self, athlete_id: Uuid, guardian_id: Uuid) -> Result<(), AppError> {
        let _timer = db_timer("link_guardian");

        sqlx::query(
            r#"
            INSERT INTO athlete_guardians (athlete_id, guardian_id)
            VALUES ($1, $2)
            ON CONFLICT (athlete_id, guardian_id) DO NOTHING
            "#,
        )
        .bind(athlete_id)
        .bind(guardian_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to link guardian", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn unlink_guardian(&self, athlete_id: Uuid, guardian_id: Uuid) -> Result<bool, AppError> {
        let _timer = db_timer("unlink_guardian");

        let result =
            sqlx::query("DELETE FROM athlete_guardians WHERE athlete_id = $1 AND guardian_id = $2")
                .bind(athlete_id)
                .bind(guardian_id)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::from_sqlx("Failed to unlink guardian", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_athlete_guardians(&self, athlete_id: Uuid) -> Result<Vec<Guardian>, AppError> {
        let pool = &self.pool;
        self.read("list_athlete_guardians", move || async move {
            sqlx::query_as::<_, Guardian>(
                r#"
                SELECT g.guardian_id, g.academy_id, g.full_name, g.email, g.phone,
                    g.relationship, g.created_utc
                FROM guardians g
                JOIN athlete_guardians ag ON ag.guardian_id = g.guardian_id
                WHERE ag.athlete_id = $1
                ORDER BY g.full_name
                "#,
            )
            .bind(athlete_id)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list athlete guardians", e))
        })
        .await
    }

    // =========================================================================
    // Groups and memberships
    // =========================================================================

    #[instrument(skip(self, group), fields(academy_id = %group.academy_id))]
    async fn insert_group(&self, group: &Group) -> Result<Group, AppError> {
        let _timer = db_timer("insert_group");

        sqlx::query_as::<_, Group>(&format!(
            r#"
            INSERT INTO training_groups (group_id, academy_id, name, description,
                monthly_fee_cents, billing_item_id, is_active, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(group.group_id)
        .bind(group.academy_id)
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.monthly_fee_cents)
        .bind(group.billing_item_id)
        .bind(group.is_active)
        .bind(group.created_utc)
        .bind(group.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to create group", e))
    }

    async fn get_group(&self, academy_id: Uuid, group_id: Uuid) -> Result<Option<Group>, AppError> {
        let pool = &self.pool;
        self.read("get_group", move || async move {
            sqlx::query_as::<_, Group>(&format!(
                "SELECT {GROUP_COLUMNS} FROM training_groups WHERE academy_id = $1 AND group_id = $2"
            ))
            .bind(academy_id)
            .bind(group_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to get group", e))
        })
        .await
    }

    async fn list_groups(
        &self,
        academy_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<Group>, AppError> {
        let pool = &self.pool;
        self.read("list_groups", move || async move {
            sqlx::query_as::<_, Group>(&format!(
                r#"
                SELECT {GROUP_COLUMNS} FROM training_groups
                WHERE academy_id = $1 AND ($2 OR is_active)
                ORDER BY name
                "#
            ))
            .bind(academy_id)
            .bind(include_inactive)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list groups", e))
        })
        .await
    }

    #[instrument(skip(self, group), fields(group_id = %group.group_id))]
    async fn update_group(&self, group: &Group) -> Result<Group, AppError> {
        let _timer = db_timer("update_group");

        sqlx::query_as::<_, Group>(&format!(
            r#"
            UPDATE training_groups
            SET name = $3, description = $4, monthly_fee_cents = $5, billing_item_id = $6,
                is_active = $7, updated_utc = $8
            WHERE academy_id = $1 AND group_id = $2
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(group.academy_id)
        .bind(group.group_id)
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.monthly_fee_cents)
        .bind(group.billing_item_id)
        .bind(group.is_active)
        .bind(group.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to update group", e))
    }

    #[instrument(skip(self, membership), fields(group_id = %membership.group_id, athlete_id = %membership.athlete_id))]
    async fn upsert_membership(
        &self,
        membership: &GroupMembership,
    ) -> Result<GroupMembership, AppError> {
        let _timer = db_timer("upsert_membership");

        sqlx::query_as::<_, GroupMembership>(&format!(
            r#"
            INSERT INTO group_memberships (group_id, athlete_id, custom_fee_cents, is_active, joined_utc)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (group_id, athlete_id) DO UPDATE
            SET custom_fee_cents = EXCLUDED.custom_fee_cents,
                is_active = EXCLUDED.is_active
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        ))
        .bind(membership.group_id)
        .bind(membership.athlete_id)
        .bind(membership.custom_fee_cents)
        .bind(membership.is_active)
        .bind(membership.joined_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to save membership", e))
    }

    async fn get_membership(
        &self,
        group_id: Uuid,
        athlete_id: Uuid,
    ) -> Result<Option<GroupMembership>, AppError> {
        let pool = &self.pool;
        self.read("get_membership", move || async move {
            sqlx::query_as::<_, GroupMembership>(&format!(
                "SELECT {MEMBERSHIP_COLUMNS} FROM group_memberships WHERE group_id = $1 AND athlete_id = $2"
            ))
            .bind(group_id)
            .bind(athlete_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to get membership", e))
        })
        .await
    }

    async fn list_memberships(&self, group_id: Uuid) -> Result<Vec<GroupMembership>, AppError> {
        let pool = &self.pool;
        self.read("list_memberships", move || async move {
            sqlx::query_as::<_, GroupMembership>(&format!(
                "SELECT {MEMBERSHIP_COLUMNS} FROM group_memberships WHERE group_id = $1 ORDER BY joined_utc"
            ))
            .bind(group_id)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list memberships", e))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_membership(&self, group_id: Uuid, athlete_id: Uuid) -> Result<bool, AppError> {
        let _timer = db_timer("delete_membership");

        let result =
            sqlx::query("DELETE FROM group_memberships WHERE group_id = $1 AND athlete_id = $2")
                .bind(group_id)
                .bind(athlete_id)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::from_sqlx("Failed to delete membership", e))?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Classes and attendance
    // =========================================================================

    #[instrument(skip(self, class), fields(academy_id = %class.academy_id))]
    async fn insert_class(&self, class: &Class) -> Result<Class, AppError> {
        let _timer = db_timer("insert_class");

        sqlx::query_as::<_, Class>(&format!(
            r#"
            INSERT INTO classes (class_id, academy_id, group_id, name, weekday, start_time,
                duration_minutes, coach_name, is_active, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {CLASS_COLUMNS}
            "#
        ))
        .bind(class.class_id)
        .bind(class.academy_id)
        .bind(class.group_id)
        .bind(&class.name)
        .bind(class.weekday)
        .bind(&class.start_time)
        .bind(class.duration_minutes)
        .bind(&class.coach_name)
        .bind(class.is_active)
        .bind(class.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to create class", e))
    }

    async fn get_class(&self, academy_id: Uuid, class_id: Uuid) -> Result<Option<Class>, AppError> {
        let pool = &self.pool;
        self.read("get_class", move || async move {
            sqlx::query_as::<_, Class>(&format!(
                "SELECT {CLASS_COLUMNS} FROM classes WHERE academy_id = $1 AND class_id = $2"
            ))
            .bind(academy_id)
            .bind(class_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to get class", e))
        })
        .await
    }

    async fn list_classes(
        &self,
        academy_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<Class>, AppError> {
        let pool = &self.pool;
        self.read("list_classes", move || async move {
            sqlx::query_as::<_, Class>(&format!(
                r#"
                SELECT {CLASS_COLUMNS} FROM classes
                WHERE academy_id = $1 AND ($2 OR is_active)
                ORDER BY weekday, start_time
                "#
            ))
            .bind(academy_id)
            .bind(include_inactive)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list classes", e))
        })
        .await
    }

    #[instrument(skip(self, class), fields(class_id = %class.class_id))]
    async fn update_class(&self, class: &Class) -> Result<Class, AppError> {
        let _timer = db_timer("update_class");

        sqlx::query_as::<_, Class>(&format!(
            r#"
            UPDATE classes
            SET group_id = $3, name = $4, weekday = $5, start_time = $6, duration_minutes = $7,
                coach_name = $8, is_active = $9
            WHERE academy_id = $1 AND class_id = $2
            RETURNING {CLASS_COLUMNS}
            "#
        ))
        .bind(class.academy_id)
        .bind(class.class_id)
        .bind(class.group_id)
        .bind(&class.name)
        .bind(class.weekday)
        .bind(&class.start_time)
        .bind(class.duration_minutes)
        .bind(&class.coach_name)
        .bind(class.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to update class", e))
    }

    #[instrument(skip(self, record), fields(class_id = %record.class_id, athlete_id = %record.athlete_id))]
    async fn upsert_attendance(
        &self,
        record: &AttendanceRecord,
    ) -> Result<AttendanceRecord, AppError> {
        let _timer = db_timer("upsert_attendance");

        sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            INSERT INTO attendance_records (attendance_id, class_id, athlete_id, session_date,
                status, recorded_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (class_id, athlete_id, session_date) DO UPDATE
            SET status = EXCLUDED.status, recorded_utc = EXCLUDED.recorded_utc
            RETURNING {ATTENDANCE_COLUMNS}
            "#
        ))
        .bind(record.attendance_id)
        .bind(record.class_id)
        .bind(record.athlete_id)
        .bind(record.session_date)
        .bind(&record.status)
        .bind(record.recorded_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to record attendance", e))
    }

    async fn list_attendance(
        &self,
        class_id: Uuid,
        session_date: Option<NaiveDate>,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        let pool = &self.pool;
        self.read("list_attendance", move || async move {
            sqlx::query_as::<_, AttendanceRecord>(&format!(
                r#"
                SELECT {ATTENDANCE_COLUMNS} FROM attendance_records
                WHERE class_id = $1 AND ($2::date IS NULL OR session_date = $2)
                ORDER BY session_date DESC, athlete_id
                "#
            ))
            .bind(class_id)
            .bind(session_date)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list attendance", e))
        })
        .await
    }
}
