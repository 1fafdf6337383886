//! PostgreSQL / PostGIS backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use tracing::{debug, info, warn};

use super::{stored_rows, PositionStore, StoredRow};
use crate::{errors::RecorderError, models::RouteSnapshot};

/// Schema objects, created in order
const SCHEMA: &[(&str, &str)] = &[
    ("postgis", "CREATE EXTENSION IF NOT EXISTS postgis"),
    (
        "vehicles",
        "CREATE TABLE IF NOT EXISTS vehicles (
            route text,
            read_time timestamptz,
            label text,
            vehicle_id text,
            block_id text,
            trip text,
            latitude double precision,
            longitude double precision,
            direction text,
            destination text,
            offset_min int,
            offset_sec int,
            heading int,
            late_min int
        )",
    ),
    (
        "vehicles.geom",
        "ALTER TABLE vehicles ADD COLUMN IF NOT EXISTS geom geometry(Point, 4326)",
    ),
    (
        "idx_vehicles_read_time",
        "CREATE INDEX IF NOT EXISTS idx_vehicles_read_time ON vehicles (read_time)",
    ),
    (
        "idx_vehicles_geom",
        "CREATE INDEX IF NOT EXISTS idx_vehicles_geom ON vehicles USING GIST (geom)",
    ),
];

const INSERT_VEHICLE: &str = "INSERT INTO vehicles (
        route, read_time, label, vehicle_id, block_id, trip,
        latitude, longitude, direction, destination,
        offset_min, offset_sec, heading, late_min, geom
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
        ST_SetSRID(ST_MakePoint($8, $7), 4326))";

/// Append-only store with a PostGIS point per row.
///
/// No uniqueness constraint: repeated observations of the same vehicle are
/// all kept.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, RecorderError> {
        info!("Connecting to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(RecorderError::DatabaseConnection)?;
        Ok(Self::new(pool))
    }

    async fn insert_row(
        tx: &mut Transaction<'_, Postgres>,
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
impl PositionStore for PostgresStore {
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
        Ok(inserted)
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn suppresses_duplicates(&self) -> bool {
        false
    }
}
