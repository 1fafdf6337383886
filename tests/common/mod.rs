#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use chrono::{DateTime, Utc};

use transit_recorder::{
    config::FeedConfig,
    models::{RouteSnapshot, VehiclePosition},
};

/// All-routes payload with one vehicle on route 17
pub const ROUTE_17_PAYLOAD: &str = r#"{"routes":[{"17":[{"lat":"39.9","lng":"-75.1","label":"to City","VehicleID":"101","BlockID":"B1","trip":"T1","Direction":"NorthBound","destination":"City Hall","offset":"2","Offset_sec":"30","heading":90,"late":2}]}]}"#;

/// A row of the `vehicles` table as read back in tests
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct VehicleRow {
    pub route: String,
    pub read_time: DateTime<Utc>,
    pub label: String,
    pub vehicle_id: String,
    pub block_id: String,
    pub trip: String,
    pub latitude: f64,
    pub longitude: f64,
    pub direction: String,
    pub destination: String,
    pub offset_min: i32,
    pub offset_sec: i32,
    pub heading: i32,
    pub late_min: i32,
}

pub const SELECT_VEHICLES: &str = "SELECT route, read_time, label, vehicle_id, block_id, trip,
    latitude, longitude, direction, destination,
    offset_min, offset_sec, heading, late_min
    FROM vehicles";

/// Serve `router` on an ephemeral local port, returning its base URL
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

pub fn feed_config(base_url: &str) -> FeedConfig {
    FeedConfig {
        all_positions_url: format!("{}/TransitViewAll/", base_url),
        route_positions_url: format!("{}/TransitView/", base_url),
        timeout: Duration::from_secs(5),
    }
}

pub fn position(vehicle_id: &str, block_id: &str, trip: &str) -> VehiclePosition {
    VehiclePosition {
        latitude: 39.95258,
        longitude: -75.16522,
        label: vehicle_id.to_string(),
        vehicle_id: vehicle_id.to_string(),
        block_id: block_id.to_string(),
        trip: trip.to_string(),
        direction: "EastBound".to_string(),
        destination: "Delaware Av".to_string(),
        offset_minutes: 1,
        offset_seconds: 30,
        heading: 90,
        late_minutes: 3,
    }
}

pub fn snapshot<const N: usize>(routes: [(&str, Vec<VehiclePosition>); N]) -> RouteSnapshot {
    routes
        .into_iter()
        .map(|(route, positions)| (route.to_string(), positions))
        .collect()
}
