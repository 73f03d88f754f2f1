//! Routing backends for the simulator.
//!
//! `GridRouter` is offline and deterministic. `OsrmRouter` asks an OSRM
//! server over HTTP; planar route coordinates are mapped to lon/lat around a
//! fixed origin.

use std::time::Duration;

use anyhow::{Context, Result};
use nav_core::geometry::{self, Point};
use nav_core::{RoutingError, RoutingService};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Earth's radius in meters.
const EARTH_RADIUS: f64 = 6371000.0;

/// Upper bound on the wait between OSRM retries.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

// ============================================================================
// GRID ROUTER
// ============================================================================

/// Manhattan router on a square street grid.
///
/// Drives from `start` onto the nearest horizontal street, along it to the
/// destination column, then straight to `end`. Every street intersection
/// passed on the way is a route point.
#[derive(Debug, Clone)]
pub struct GridRouter {
    block: f64,
}

impl GridRouter {
    pub fn new(block: f64) -> Self {
        Self {
            block: block.max(1.0),
        }
    }

    fn snap(&self, v: f64) -> f64 {
        (v / self.block).round() * self.block
    }

    /// Grid lines strictly between `from` and `to`, in travel order.
    fn crossings(&self, from: f64, to: f64) -> Vec<f64> {
        let (lo, hi) = (from.min(to), from.max(to));
        let first = (lo / self.block).floor() as i64 + 1;
        let last = (hi / self.block).ceil() as i64 - 1;
        let mut lines: Vec<f64> = (first..=last).map(|k| k as f64 * self.block).collect();
        if to < from {
            lines.reverse();
        }
        lines
    }
}

impl RoutingService for GridRouter {
    fn compute_route(&self, start: Point, end: Point) -> Result<Vec<Point>, RoutingError> {
        if geometry::distance(start, end) < geometry::EPSILON {
            return Err(RoutingError::NoRoute);
        }

        let street = self.snap(start.1);
        let mut corners = vec![start, (start.0, street)];
        corners.extend(self.crossings(start.0, end.0).into_iter().map(|x| (x, street)));
        corners.push((end.0, street));
        corners.extend(self.crossings(street, end.1).into_iter().map(|y| (end.0, y)));
        corners.push(end);

        let mut points: Vec<Point> = Vec::with_capacity(corners.len());
        for corner in corners {
            let duplicate = points
                .last()
                .is_some_and(|&last| geometry::distance(last, corner) < geometry::EPSILON);
            if !duplicate {
                points.push(corner);
            }
        }
        Ok(points)
    }
}

// ============================================================================
// OSRM ROUTER
// ============================================================================

/// Equirectangular mapping between planar meters and lon/lat around an origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    pub origin_lat: f64,
    pub origin_lon: f64,
}

impl LocalFrame {
    pub fn new(origin_lat: f64, origin_lon: f64) -> Self {
        Self {
            origin_lat,
            origin_lon,
        }
    }

    /// Planar `(x east, y north)` meters to `(lon, lat)` degrees.
    pub fn to_lon_lat(&self, p: Point) -> (f64, f64) {
        let lat = self.origin_lat + (p.1 / EARTH_RADIUS).to_degrees();
        let lon = self.origin_lon
            + (p.0 / (EARTH_RADIUS * self.origin_lat.to_radians().cos())).to_degrees();
        (lon, lat)
    }

    pub fn to_planar(&self, lon: f64, lat: f64) -> Point {
        let x = (lon - self.origin_lon).to_radians()
            * EARTH_RADIUS
            * self.origin_lat.to_radians().cos();
        let y = (lat - self.origin_lat).to_radians() * EARTH_RADIUS;
        (x, y)
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

/// Decode an OSRM `/route` body requested with `geometries=geojson`.
pub fn parse_osrm_route(body: &str, frame: &LocalFrame) -> Result<Vec<Point>, RoutingError> {
    let response: OsrmResponse =
        serde_json::from_str(body).map_err(|e| RoutingError::InvalidResponse(e.to_string()))?;

    match response.code.as_str() {
        "Ok" => {}
        "NoRoute" | "NoSegment" => return Err(RoutingError::NoRoute),
        other => {
            return Err(RoutingError::InvalidResponse(format!(
                "{}: {}",
                other,
                response.message.unwrap_or_default()
            )))
        }
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or(RoutingError::NoRoute)?;
    let points: Vec<Point> = route
        .geometry
        .coordinates
        .iter()
        .map(|[lon, lat]| frame.to_planar(*lon, *lat))
        .collect();
    if points.len() < 2 {
        return Err(RoutingError::TooFewPoints {
            points: points.len(),
        });
    }
    Ok(points)
}

pub struct OsrmRouter {
    http_client: reqwest::Client,
    base_url: String,
    frame: LocalFrame,
    max_retries: u32,
    backoff: Duration,
}

impl OsrmRouter {
    pub fn new(
        base_url: String,
        frame: LocalFrame,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url,
            frame,
            max_retries,
            backoff: Duration::from_millis(250),
        })
    }

    fn route_url(&self, start: Point, end: Point) -> String {
        let (lon1, lat1) = self.frame.to_lon_lat(start);
        let (lon2, lat2) = self.frame.to_lon_lat(end);
        format!(
            "{}/route/v1/driving/{:.6},{:.6};{:.6},{:.6}?overview=full&geometries=geojson",
            self.base_url.trim_end_matches('/'),
            lon1,
            lat1,
            lon2,
            lat2
        )
    }

    /// Fetch a route, retrying transient failures with exponential backoff.
    pub async fn fetch(&self, start: Point, end: Point) -> Result<Vec<Point>, RoutingError> {
        let url = self.route_url(start, end);
        let mut attempt = 0;
        loop {
            match self.fetch_once(&url).await {
                Ok(points) => {
                    info!(points = points.len(), attempt, "OSRM route received");
                    return Ok(points);
                }
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = backoff_delay(self.backoff, attempt);
                    warn!(%err, attempt, ?delay, "OSRM request failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<Point>, RoutingError> {
        debug!(url, "OSRM request");
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| RoutingError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(RoutingError::Transport(format!("server returned {}", status)));
        }
        let body = response
            .text()
            .await
            .map_err(|e| RoutingError::Transport(e.to_string()))?;
        // OSRM reports NoRoute and friends with 400 and a JSON body
        parse_osrm_route(&body, &self.frame)
    }
}

/// `base * 2^attempt`, saturating and capped at [`MAX_BACKOFF`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_BACKOFF)
}

// ============================================================================
// BACKEND SELECTION
// ============================================================================

pub enum Router {
    Grid(GridRouter),
    Osrm(OsrmRouter),
}

impl Router {
    pub async fn route(&self, start: Point, end: Point) -> Result<Vec<Point>, RoutingError> {
        match self {
            Router::Grid(grid) => grid.compute_route(start, end),
            Router::Osrm(osrm) => osrm.fetch(start, end).await,
        }
    }
}
