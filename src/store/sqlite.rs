//! SQLite backend

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Sqlite, SqlitePool, Transaction,
};
use tracing::{debug, info, warn};

use super::{stored_rows, PositionStore, StoredRow};
use crate::{errors::RecorderError, models::RouteSnapshot};

const SCHEMA: &[(&str, &str)] = &[
    (
        "vehicles",
        "CREATE TABLE IF NOT EXISTS vehicles (
            route TEXT NOT NULL,
            read_time TEXT NOT NULL,
            label TEXT NOT NULL,
            vehicle_id TEXT NOT NULL,
            block_id TEXT NOT NULL,
            trip TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            direction TEXT NOT NULL,
            destination TEXT NOT NULL,
            offset_min INTEGER NOT NULL,
            offset_sec INTEGER NOT NULL,
            heading INTEGER NOT NULL,
            late_min INTEGER NOT NULL,
            UNIQUE (route, trip, vehicle_id, block_id)
        )",
    ),
    (
        "idx_vehicles_read_time",
        "CREATE INDEX IF NOT EXISTS idx_vehicles_read_time ON vehicles (read_time)",
    ),
];

// Only the uniqueness conflict is ignored, any other failure aborts the batch
const INSERT_VEHICLE: &str = "INSERT INTO vehicles (
        route, read_time, label, vehicle_id, block_id, trip,
        latitude, longitude, direction, destination,
        offset_min, offset_sec, heading, late_min
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
    ON CONFLICT (route, trip, vehicle_id, block_id) DO NOTHING";

/// Store with duplicate suppression on (route, trip, vehicle_id, block_id).
///
/// A row whose key already exists is dropped even when its `read_time`
/// differs, so each trip of a vehicle on a route is recorded once.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database, creating the file if needed
    pub async fn connect(url: &str) -> Result<Self, RecorderError> {
        info!("Opening SQLite database");
        let options = SqliteConnectOptions::from_str(url)
            .map_err(RecorderError::DatabaseConnection)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(RecorderError::DatabaseConnection)?;
        Ok(Self::new(pool))
    }

    async fn insert_row(
        tx: &mut Transaction<'_, Sqlite>,
        row: &StoredRow<'_>,
    ) -> Result<u64, sqlx::Error> {
        let position = row.position;
        let result = sqlx::query(INSERT_VEHICLE)
            .bind(row.route)
            .bind(row.read_time)
            .bind(&position.label)
            .bind(&position.vehicle_id)
            .bind(&position.block_id)
            .bind(&position.trip)
            .bind(position.latitude)
            .bind(position.longitude)
            .bind(&position.direction)
            .bind(&position.destination)
            .bind(position.offset_minutes)
            .bind(position.offset_seconds)
            .bind(position.heading)
            .bind(position.late_minutes)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PositionStore for SqliteStore {
    async fn initialize(&self) -> Result<(), RecorderError> {
        for &(object, statement) in SCHEMA {
            debug!("Ensuring schema object {}", object);
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|source| RecorderError::Schema {
                    object: object.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    async fn insert_snapshot(
        &self,
        captured_at: DateTime<Utc>,
        snapshot: &RouteSnapshot,
    ) -> Result<u64, RecorderError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for row in stored_rows(captured_at, snapshot) {
            let result = Self::insert_row(&mut tx, &row).await;
            match result {
                Ok(count) => inserted += count,
                Err(e) => {
                    if let Err(rollback_error) = tx.rollback().await {
                        warn!("Rollback failed: {}", rollback_error);
                    }
                    return Err(e.into());
                }
            }
        }

        tx.commit().await?;

        let skipped = snapshot.position_count() as u64 - inserted;
        if skipped > 0 {
            debug!("Skipped {} duplicate rows", skipped);
        }
        Ok(inserted)
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn suppresses_duplicates(&self) -> bool {
        true
    }
}
