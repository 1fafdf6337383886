//! Persistent storage of vehicle positions
//!
//! Two backends share the `vehicles` table layout but differ in what they
//! guarantee about duplicates:
//!
//! - [`PostgresStore`] (PostGIS) adds a `geom` point column and has no
//!   uniqueness constraint. Every row of every snapshot is appended.
//! - [`SqliteStore`] has no geometry and enforces
//!   `UNIQUE (route, trip, vehicle_id, block_id)`. Rows that conflict with an
//!   existing row are silently dropped, whatever their `read_time`.
//!
//! Callers must not assume duplicate suppression unless
//! [`PositionStore::suppresses_duplicates`] says so.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    errors::RecorderError,
    models::{RouteSnapshot, VehiclePosition},
};

pub mod postgres;
pub mod sqlite;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Create the schema if it does not exist yet. Safe to call on every start.
    async fn initialize(&self) -> Result<(), RecorderError>;

    /// Write every position of `snapshot` with `read_time = captured_at`.
    ///
    /// All rows are written in one transaction. If any row fails the
    /// transaction is rolled back and no row of the snapshot is kept.
    /// Returns the number of rows written, which is less than the number of
    /// positions only for a backend that suppresses duplicates.
    async fn insert_snapshot(
        &self,
        captured_at: DateTime<Utc>,
        snapshot: &RouteSnapshot,
    ) -> Result<u64, RecorderError>;

    /// Close the database connection
    async fn close(&self);

    /// Short backend name for logging
    fn backend(&self) -> &'static str;

    /// Whether rows conflicting on (route, trip, vehicle_id, block_id) are dropped
    fn suppresses_duplicates(&self) -> bool;
}

/// One row of the `vehicles` table, borrowed from a snapshot
#[derive(Debug, Clone, Copy)]
pub struct StoredRow<'a> {
    pub route: &'a str,
    pub read_time: DateTime<Utc>,
    pub position: &'a VehiclePosition,
}

/// Flatten a snapshot into rows sharing one `read_time`
pub fn stored_rows(
    read_time: DateTime<Utc>,
    snapshot: &RouteSnapshot,
) -> impl Iterator<Item = StoredRow<'_>> {
    snapshot.routes().flat_map(move |(route, positions)| {
        positions.iter().map(move |position| StoredRow {
            route,
            read_time,
            position,
        })
    })
}

/// Open the backend matching the URL scheme
pub async fn connect(url: &str) -> Result<Box<dyn PositionStore>, RecorderError> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Ok(Box::new(PostgresStore::connect(url).await?))
    } else if url.starts_with("sqlite:") {
        Ok(Box::new(SqliteStore::connect(url).await?))
    } else {
        // Only the scheme, the rest may hold credentials
        let scheme = url.split(':').next().unwrap_or_default();
        Err(RecorderError::UnsupportedDatabaseUrl(scheme.to_string()))
    }
}
