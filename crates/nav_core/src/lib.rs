//! # nav_core - Route Tracking and Course-Deviation Engine
//!
//! Tracks a moving point along a polyline route, notices when it has left
//! the route, and asks a routing collaborator for a new one. A simulated
//! mover drives the point along the route so the whole loop can run without
//! a GPS source.
//!
//! ## Features
//! - Speed sampling with outlier rejection
//! - Segment tracking with a full-scan fallback after position jumps
//! - Edge-triggered deviation detection with a consecutive-tick threshold
//! - Sans-IO routing: requests go out through an outbox, stale responses are dropped
//! - Deterministic detour generation (same seed = same wrong turn)
//!
//! Everything advances from [`Navigator::tick`]; nothing here spawns threads
//! or blocks on I/O.

pub mod config;
pub mod controller;
pub mod deviation;
pub mod deviation_generator;
pub mod direction;
pub mod error;
pub mod events;
pub mod geometry;
pub mod mover;
pub mod navigator;
pub mod route;
pub mod routing;
pub mod sampler;
pub mod segment_tracker;

pub use config::TrackingConfig;
pub use controller::{Delivery, Observation, RouteController};
pub use error::{NavError, Result, RoutingError};
pub use events::{NavEvent, RouteEvent, SimulationEvent, SubscriptionId};
pub use geometry::Point;
pub use mover::{MoverState, SimulatedMover};
pub use navigator::Navigator;
pub use route::Route;
pub use routing::{RequestKind, RouteRequest, RouteResponse, RoutingService};
