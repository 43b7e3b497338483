use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use uuid::Uuid;

use super::{DEFAULT_REFERRER_TYPES, RepoError, RepoResult, Repository};
use crate::models::{
    NewReferrer, NewReferrerType, Referrer, ReferrerListItem, ReferrerType, User,
};

// Serialises default seeding across processes sharing one database.
const SEED_LOCK_KEY: i64 = 0x7265_6665_7272;

const LIST_SELECT: &str = r#"
    SELECT
        r.idreferrer, r.referrer_name, r.referrer_type,
        t.referrer_type_name, t.referrer_type_desc
    FROM referrers r
    LEFT JOIN referrer_types t ON t.idreferrer_type = r.referrer_type
"#;

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Identity columns assign ids, and
/// foreign keys with `ON DELETE RESTRICT` enforce referential integrity.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps a foreign-key violation to `on_fk`, everything else to `Database`.
fn classify(err: sqlx::Error, on_fk: RepoError) -> RepoError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_foreign_key_violation() {
            return on_fk;
        }
    }
    RepoError::Database(err)
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, email, role FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// list_referrers
    ///
    /// The optional type filter is appended with `QueryBuilder` so the value is
    /// always bound, never interpolated.
    async fn list_referrers(&self, referrer_type: Option<i64>) -> RepoResult<Vec<ReferrerListItem>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(LIST_SELECT);

        if let Some(type_id) = referrer_type {
            builder.push(" WHERE r.referrer_type = ");
            builder.push_bind(type_id);
        }

        builder.push(" ORDER BY r.referrer_name ASC, r.idreferrer ASC");

        let rows = builder
            .build_query_as::<ReferrerListItem>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_referrer(&self, id: i64) -> RepoResult<Option<Referrer>> {
        let row = sqlx::query_as::<_, Referrer>(
            "SELECT idreferrer, referrer_name, referrer_type FROM referrers WHERE idreferrer = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn count_referrer_jobs(&self, id: i64) -> RepoResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs WHERE referrer = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn create_referrer(&self, new: &NewReferrer) -> RepoResult<Referrer> {
        sqlx::query_as::<_, Referrer>(
            r#"
            INSERT INTO referrers (referrer_name, referrer_type)
            VALUES ($1, $2)
            RETURNING idreferrer, referrer_name, referrer_type
            "#,
        )
        .bind(&new.name)
        .bind(new.referrer_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, RepoError::UnknownReference))
    }

    async fn update_referrer(&self, id: i64, new: &NewReferrer) -> RepoResult<Option<Referrer>> {
        sqlx::query_as::<_, Referrer>(
            r#"
            UPDATE referrers
            SET referrer_name = $2, referrer_type = $3
            WHERE idreferrer = $1
            RETURNING idreferrer, referrer_name, referrer_type
            "#,
        )
        .bind(id)
        .bind(&new.name)
        .bind(new.referrer_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(e, RepoError::UnknownReference))
    }

    async fn delete_referrer(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM referrers WHERE idreferrer = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, RepoError::InUse))?;
        Ok(result.rows_affected() > 0)
    }

    /// search_referrers
    ///
    /// `ILIKE` against both the referrer name and the joined type name. The
    /// keyword's own `%` and `_` are escaped so they match literally.
    async fn search_referrers(&self, keyword: &str) -> RepoResult<Vec<ReferrerListItem>> {
        let escaped = keyword
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{}%", escaped);

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(LIST_SELECT);
        builder.push(" WHERE r.referrer_name ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR t.referrer_type_name ILIKE ");
        builder.push_bind(pattern);
        builder.push(" ORDER BY r.referrer_name ASC, r.idreferrer ASC");

        let rows = builder
            .build_query_as::<ReferrerListItem>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_referrer_types(&self) -> RepoResult<Vec<ReferrerType>> {
        let rows = sqlx::query_as::<_, ReferrerType>(
            r#"
            SELECT idreferrer_type, referrer_type_name, referrer_type_desc
            FROM referrer_types
            ORDER BY referrer_type_name ASC, idreferrer_type ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_referrer_type(&self, id: i64) -> RepoResult<Option<ReferrerType>> {
        let row = sqlx::query_as::<_, ReferrerType>(
            r#"
            SELECT idreferrer_type, referrer_type_name, referrer_type_desc
            FROM referrer_types
            WHERE idreferrer_type = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn count_type_referrers(&self, id: i64) -> RepoResult<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM referrers WHERE referrer_type = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn create_referrer_type(&self, new: &NewReferrerType) -> RepoResult<ReferrerType> {
        let row = sqlx::query_as::<_, ReferrerType>(
            r#"
            INSERT INTO referrer_types (referrer_type_name, referrer_type_desc)
            VALUES ($1, $2)
            RETURNING idreferrer_type, referrer_type_name, referrer_type_desc
            "#,
        )
        .bind(&new.name)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_referrer_type(
        &self,
        id: i64,
        new: &NewReferrerType,
    ) -> RepoResult<Option<ReferrerType>> {
        let row = sqlx::query_as::<_, ReferrerType>(
            r#"
            UPDATE referrer_types
            SET referrer_type_name = $2, referrer_type_desc = $3
            WHERE idreferrer_type = $1
            RETURNING idreferrer_type, referrer_type_name, referrer_type_desc
            "#,
        )
        .bind(id)
        .bind(&new.name)
        .bind(&new.description)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_referrer_type(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM referrer_types WHERE idreferrer_type = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, RepoError::InUse))?;
        Ok(result.rows_affected() > 0)
    }

    /// ensure_default_types
    ///
    /// Runs in one transaction holding an advisory lock, so two instances
    /// booting together cannot both see an empty table and seed twice.
    async fn ensure_default_types(&self) -> RepoResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SEED_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO referrer_types (referrer_type_name, referrer_type_desc) SELECT d.name, d.descr FROM (",
        );
        builder.push_values(DEFAULT_REFERRER_TYPES.iter(), |mut row, (name, descr)| {
            row.push_bind(*name).push_bind(*descr);
        });
        builder.push(") AS d(name, descr) WHERE NOT EXISTS (SELECT 1 FROM referrer_types)");

        let inserted = builder.build().execute(&mut *tx).await?.rows_affected();

        tx.commit().await?;
        Ok(inserted)
    }
}
