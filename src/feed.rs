//! TransitView feed client

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    config::FeedConfig,
    errors::{DecodeError, RecorderError},
    models::{RouteSnapshot, VehiclePosition},
};

/// Source of vehicle positions
#[async_trait]
pub trait PositionFeed: Send + Sync {
    /// Positions of every vehicle on every route
    async fn fetch_all_positions(&self) -> Result<RouteSnapshot, RecorderError>;

    /// Positions of the vehicles on a single route
    async fn fetch_route_positions(
        &self,
        route: &str,
    ) -> Result<Vec<VehiclePosition>, RecorderError>;
}

/// HTTP client for the TransitView API
///
/// Holds no state besides the connection pool of the inner client, so a
/// single instance can be shared between tasks.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: Client,
    all_positions_url: Url,
    route_positions_url: Url,
}

/// `{"routes": [{"<route>": [<position>, ...], ...}]}`
#[derive(Debug, Deserialize)]
struct AllRoutesResponse {
    routes: Vec<RouteSnapshot>,
}

/// `{"bus": [<position>, ...]}`
#[derive(Debug, Deserialize)]
struct RouteResponse {
    bus: Vec<VehiclePosition>,
}

impl FeedClient {
    pub fn new(config: &FeedConfig) -> Result<Self, RecorderError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(RecorderError::Transport)?;

        Ok(Self {
            client,
            all_positions_url: parse_base_url(&config.all_positions_url)?,
            route_positions_url: parse_base_url(&config.route_positions_url)?,
        })
    }

    /// Single-route URL, with the label escaped as one path segment
    fn route_url(&self, route: &str) -> Url {
        let mut url = self.route_positions_url.clone();
        // Base URLs are checked in `parse_base_url`
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(route);
        }
        url
    }

    async fn get(&self, url: Url) -> Result<impl AsRef<[u8]>, RecorderError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(RecorderError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecorderError::Http {
                url: url.to_string(),
                status,
            });
        }

        response.bytes().await.map_err(RecorderError::Transport)
    }
}

#[async_trait]
impl PositionFeed for FeedClient {
    async fn fetch_all_positions(&self) -> Result<RouteSnapshot, RecorderError> {
        let body = self.get(self.all_positions_url.clone()).await?;
        Ok(decode_all_routes(body.as_ref())?)
    }

    async fn fetch_route_positions(
        &self,
        route: &str,
    ) -> Result<Vec<VehiclePosition>, RecorderError> {
        let body = self.get(self.route_url(route)).await?;
        Ok(decode_route(body.as_ref())?)
    }
}

fn parse_base_url(url: &str) -> Result<Url, RecorderError> {
    let parsed = Url::parse(url).map_err(|e| RecorderError::ConfigurationError {
        message: format!("Invalid feed URL {:?}: {}", url, e),
    })?;
    if parsed.cannot_be_a_base() {
        return Err(RecorderError::ConfigurationError {
            message: format!("Feed URL {:?} cannot be used as a base", url),
        });
    }
    Ok(parsed)
}

/// Decode an all-routes payload.
///
/// The route map is wrapped in a one-element array. An empty array is an
/// error, not an empty snapshot; elements after the first are ignored.
pub fn decode_all_routes(body: &[u8]) -> Result<RouteSnapshot, DecodeError> {
    let response: AllRoutesResponse = serde_json::from_slice(body)?;

    let extra = response.routes.len().saturating_sub(1);
    let snapshot = response
        .routes
        .into_iter()
        .next()
        .ok_or(DecodeError::EmptyRoutes)?;

    if extra > 0 {
        warn!("All-routes payload has {} extra route maps, ignoring", extra);
    }

    Ok(snapshot)
}

/// Decode a single-route payload
pub fn decode_route(body: &[u8]) -> Result<Vec<VehiclePosition>, DecodeError> {
    let response: RouteResponse = serde_json::from_slice(body)?;
    Ok(response.bus)
}
