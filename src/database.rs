use chrono::NaiveDateTime;
use chrono_tz::Tz;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::utils::local_now;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Reading {
    pub id: i64,
    pub location_id: String,
    pub wait_time: i64,
    pub recorded_at: NaiveDateTime,
}

/// One (day, hour) bucket as stored: `day_of_week` is 0 = Sunday.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DayHourAggregate {
    pub day_of_week: i64,
    pub hour: i64,
    pub mean: i64,
    pub count: i64,
}

/// Append-only log of wait-time readings. Timestamps are written as local
/// wall-clock fields in the deployment timezone so that aggregation buckets
/// by local hour.
pub struct ReadingStore {
    pool: SqlitePool,
    timezone: Tz,
}

impl ReadingStore {
    pub fn new(pool: SqlitePool, timezone: Tz) -> Self {
        Self { pool, timezone }
    }

    pub async fn init_tables(&self) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                location_id TEXT NOT NULL,
                wait_time INTEGER NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_readings_location_id ON readings(location_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_readings_recorded_at ON readings(recorded_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Record a reading stamped with the current local time.
    pub async fn append(&self, location_id: &str, wait_time: u32) -> Result<i64, DatabaseError> {
        self.append_at(location_id, wait_time, local_now(self.timezone))
            .await
    }

    pub async fn append_at(
        &self,
        location_id: &str,
        wait_time: u32,
        recorded_at: NaiveDateTime,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO readings (location_id, wait_time, recorded_at) VALUES ($1, $2, $3)",
        )
        .bind(location_id)
        .bind(i64::from(wait_time))
        .bind(recorded_at.format(TIMESTAMP_FORMAT).to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Record several readings under one timestamp. Either all rows land or
    /// none do.
    pub async fn append_batch(&self, readings: &[(&str, u32)]) -> Result<usize, DatabaseError> {
        let recorded_at = local_now(self.timezone).format(TIMESTAMP_FORMAT).to_string();
        let mut tx = self.pool.begin().await?;

        for (location_id, wait_time) in readings {
            sqlx::query(
                "INSERT INTO readings (location_id, wait_time, recorded_at) VALUES ($1, $2, $3)",
            )
            .bind(*location_id)
            .bind(i64::from(*wait_time))
            .bind(&recorded_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(readings.len())
    }

    pub async fn latest(&self, location_id: &str) -> Result<Option<Reading>, DatabaseError> {
        let reading = sqlx::query_as::<_, Reading>(
            r#"
            SELECT id, location_id, wait_time, recorded_at FROM readings
            WHERE location_id = $1
            ORDER BY recorded_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reading)
    }

    pub async fn count(&self, location_id: &str) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM readings WHERE location_id = $1")
            .bind(location_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Readings at or after `since` (local time), newest first.
    pub async fn history(
        &self,
        location_id: &str,
        since: NaiveDateTime,
        limit: Option<i64>,
    ) -> Result<Vec<Reading>, DatabaseError> {
        let limit = limit.unwrap_or(100).clamp(1, 1000);

        let readings = sqlx::query_as::<_, Reading>(
            r#"
            SELECT id, location_id, wait_time, recorded_at FROM readings
            WHERE location_id = $1 AND recorded_at >= $2
            ORDER BY recorded_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(location_id)
        .bind(since.format(TIMESTAMP_FORMAT).to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(readings)
    }

    /// Mean wait time per (day-of-week, hour) for one location, in storage
    /// order. Buckets without readings are absent.
    pub async fn aggregate_by_day_hour(
        &self,
        location_id: &str,
    ) -> Result<Vec<DayHourAggregate>, DatabaseError> {
        let rows = sqlx::query_as::<_, DayHourAggregate>(
            r#"
            SELECT
                CAST(strftime('%w', recorded_at) AS INTEGER) AS day_of_week,
                CAST(strftime('%H', recorded_at) AS INTEGER) AS hour,
                CAST(ROUND(AVG(wait_time)) AS INTEGER) AS mean,
                COUNT(*) AS count
            FROM readings
            WHERE location_id = $1
            GROUP BY day_of_week, hour
            ORDER BY day_of_week, hour
            "#,
        )
        .bind(location_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Makes inserts for one location fail, for exercising write errors.
#[cfg(test)]
pub(crate) async fn reject_inserts_for(store: &ReadingStore, location_id: &str) {
    let trigger = format!(
        "CREATE TRIGGER reject_{name} BEFORE INSERT ON readings \
         WHEN NEW.location_id = '{id}' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        name = location_id.replace('-', "_"),
        id = location_id,
    );
    sqlx::query(&trigger).execute(store.pool()).await.unwrap();
}

#[cfg(test)]
pub(crate) async fn memory_store() -> ReadingStore {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = ReadingStore::new(pool, chrono_tz::America::New_York);
    store.init_tables().await.unwrap();
    store
}
