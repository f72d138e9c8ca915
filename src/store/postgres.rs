use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use std::time::Duration;

use super::{apply_mutation, StoreError, Versioned, INITIAL_VERSION};
use crate::models::{KeyRecord, KeyStatus};

#[derive(Debug, FromRow)]
struct KeyRow {
    key: String,
    issued_at: DateTime<Utc>,
    status: String,
    hwid: Option<String>,
    activated_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<KeyRow> for Versioned {
    type Error = StoreError;

    fn try_from(row: KeyRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<KeyStatus>()
            .map_err(|e| StoreError::Corrupt(format!("{} (key {})", e, row.key)))?;

        Ok(Versioned {
            record: KeyRecord {
                key: row.key,
                issued_date: row.issued_at,
                status,
                hwid: row.hwid,
                activated_at: row.activated_at,
            },
            version: row.version as u64,
        })
    }
}

/// Key store on a `license_keys` table.
///
/// Compare-and-update is a conditional `UPDATE .. WHERE version = $expected`,
/// so concurrent writers from several processes are safe.
#[derive(Clone)]
pub struct PgKeyStore {
    pool: PgPool,
}

impl PgKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and brings the schema up to date
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;

        tracing::info!("License key schema migrated");

        Ok(Self::new(pool))
    }

    pub async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        let row = sqlx::query_as::<_, KeyRow>(
            r#"
            SELECT key, issued_at, status, hwid, activated_at, version
            FROM license_keys WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Versioned::try_from).transpose()
    }

    pub async fn insert_if_absent(&self, record: KeyRecord) -> Result<Versioned, StoreError> {
        if !record.binding_is_consistent() {
            return Err(StoreError::InvariantViolation {
                key: record.key,
                reason: "hwid and activatedAt must be set together",
            });
        }

        let row = sqlx::query_as::<_, KeyRow>(
            r#"
            INSERT INTO license_keys (key, issued_at, status, hwid, activated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (key) DO NOTHING
            RETURNING key, issued_at, status, hwid, activated_at, version
            "#,
        )
        .bind(&record.key)
        .bind(record.issued_date)
        .bind(record.status.as_str())
        .bind(&record.hwid)
        .bind(record.activated_at)
        .bind(INITIAL_VERSION as i64)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Versioned::try_from(row),
            None => Err(StoreError::AlreadyExists(record.key)),
        }
    }

    pub async fn compare_and_update<F>(
        &self,
        key: &str,
        expected_version: u64,
        mutator: F,
    ) -> Result<Versioned, StoreError>
    where
        F: FnOnce(&mut KeyRecord),
    {
        let current = self
            .get(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                key: key.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }

        let next = apply_mutation(&current.record, mutator)?;

        let row = sqlx::query_as::<_, KeyRow>(
            r#"
            UPDATE license_keys
            SET status = $3, hwid = $4, activated_at = $5, version = version + 1
            WHERE key = $1 AND version = $2
            RETURNING key, issued_at, status, hwid, activated_at, version
            "#,
        )
        .bind(key)
        .bind(expected_version as i64)
        .bind(next.status.as_str())
        .bind(&next.hwid)
        .bind(next.activated_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Versioned::try_from(row),
            // Lost the race between our read and the conditional update
            None => match self.get(key).await? {
                Some(latest) => Err(StoreError::VersionConflict {
                    key: key.to_string(),
                    expected: expected_version,
                    actual: latest.version,
                }),
                None => Err(StoreError::NotFound(key.to_string())),
            },
        }
    }

    pub async fn list(&self) -> Result<Vec<KeyRecord>, StoreError> {
        let rows = sqlx::query_as::<_, KeyRow>(
            r#"
            SELECT key, issued_at, status, hwid, activated_at, version
            FROM license_keys
            ORDER BY seq
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Versioned::try_from(row).map(|v| v.record))
            .collect()
    }

    pub async fn ping(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM license_keys")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }
}
