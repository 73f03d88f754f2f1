//! Contract with the external routing collaborator.
//!
//! The engine never calls a router from inside a tick. It queues
//! [`RouteRequest`]s; a driver executes them however it likes (thread, async
//! task, inline) and hands back [`RouteResponse`]s. Every request carries a
//! sequence number and only the latest issued one is honoured.

use serde::Serialize;

use crate::error::RoutingError;
use crate::geometry::Point;

/// Computes a drivable polyline between two points.
///
/// Implementations may retry transient failures internally; the engine only
/// looks at the final result.
pub trait RoutingService {
    fn compute_route(&self, start: Point, end: Point) -> Result<Vec<Point>, RoutingError>;
}

impl<F> RoutingService for F
where
    F: Fn(Point, Point) -> Result<Vec<Point>, RoutingError>,
{
    fn compute_route(&self, start: Point, end: Point) -> Result<Vec<Point>, RoutingError> {
        self(start, end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// User asked for a route
    Initial,
    /// Issued after a course deviation
    Recalculation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteRequest {
    pub seq: u64,
    pub start: Point,
    pub end: Point,
    pub kind: RequestKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    pub seq: u64,
    pub result: Result<Vec<Point>, RoutingError>,
}

impl RouteResponse {
    /// Run `request` against `service` synchronously.
    pub fn resolve(request: &RouteRequest, service: &dyn RoutingService) -> Self {
        Self {
            seq: request.seq,
            result: service.compute_route(request.start, request.end),
        }
    }
}

/// Monotonic sequence numbers with "latest wins" semantics.
#[derive(Debug, Clone, Default)]
pub struct RequestSequencer {
    latest: u64,
    in_flight: Option<(u64, RequestKind)>,
}

impl RequestSequencer {
    /// Issue a new sequence number, superseding any request in flight.
    pub fn issue(&mut self, kind: RequestKind) -> u64 {
        self.latest += 1;
        self.in_flight = Some((self.latest, kind));
        self.latest
    }

    /// Claim the in-flight slot for `seq`. Returns the kind when `seq` is the
    /// latest issued and still pending; `None` for superseded or duplicate
    /// responses.
    pub fn complete(&mut self, seq: u64) -> Option<RequestKind> {
        match self.in_flight {
            Some((pending, kind)) if pending == seq => {
                self.in_flight = None;
                Some(kind)
            }
            _ => None,
        }
    }

    /// Forget the pending request; its response will be dropped.
    pub fn abandon(&mut self) {
        self.in_flight = None;
    }

    pub fn latest(&self) -> u64 {
        self.latest
    }

    pub fn pending(&self) -> Option<(u64, RequestKind)> {
        self.in_flight
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }
}
