//! Simulated mover
//!
//! Drives one point along the active route at constant speed, segment by
//! segment. Lifecycle events from the controller decide whether it waits for
//! a manual start or resumes on its own.
//!
//! ## State machine
//!
//! ```text
//! Idle ──route available──► AwaitingStart ──manual start──► Running
//!   ▲                                                        │
//!   │◄─────────── route hidden (any state) ──────────────────┤
//!   │◄─────────── Completed ◄── last point reached ──────────┘
//! ```
//!
//! - The first run of a session warps to the route's first point. Later
//!   routes are spliced in from wherever the mover physically is.
//! - `RouteRecalculated` arms auto-start for the following route, skipping
//!   `AwaitingStart`.
//! - An alternate (detour) route is spliced in on the next tick. While on it,
//!   reaching the original destination completes the run; running off its end
//!   splices back onto the stored route.

use tracing::{debug, info};

use crate::config::SimulationSettings;
use crate::error::{NavError, Result};
use crate::events::{EventQueue, SimulationEvent};
use crate::geometry::{self, Point};
use crate::route::Route;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoverState {
    Idle,
    AwaitingStart,
    Running,
    Completed,
}

enum StepOutcome {
    Moving,
    Arrived,
    Exhausted,
}

#[derive(Debug)]
pub struct SimulatedMover {
    settings: SimulationSettings,
    state: MoverState,
    /// Last route made available; what a manual start drives.
    route: Option<Route>,
    /// Polyline actually being driven (after warp or splice).
    path: Vec<Point>,
    next_index: usize,
    position: Option<Point>,
    heading: Option<Point>,
    warped_this_session: bool,
    auto_start_next: bool,
    pending_alternate: Option<Vec<Point>>,
    following_alternate: bool,
    original_target: Option<Point>,
    events: EventQueue<SimulationEvent>,
}

impl SimulatedMover {
    pub fn new(settings: SimulationSettings) -> Self {
        Self {
            settings,
            state: MoverState::Idle,
            route: None,
            path: Vec::new(),
            next_index: 0,
            position: None,
            heading: None,
            warped_this_session: false,
            auto_start_next: false,
            pending_alternate: None,
            following_alternate: false,
            original_target: None,
            events: EventQueue::default(),
        }
    }

    pub fn state(&self) -> MoverState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == MoverState::Running
    }

    pub fn position(&self) -> Option<Point> {
        self.position
    }

    /// Unit direction of the last movement.
    pub fn heading(&self) -> Option<Point> {
        self.heading
    }

    pub fn path(&self) -> &[Point] {
        &self.path
    }

    /// Index into [`path`](Self::path) of the point being driven towards.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn is_following_alternate(&self) -> bool {
        self.following_alternate
    }

    pub fn original_target(&self) -> Option<Point> {
        self.original_target
    }

    pub fn drain_events(&mut self) -> Vec<SimulationEvent> {
        self.events.drain()
    }

    /// The next `RouteAvailable` belongs to a recalculation: resume by itself.
    pub fn on_route_recalculated(&mut self) {
        self.auto_start_next = true;
    }

    pub fn on_route_available(&mut self, route: Route) {
        let auto_start = std::mem::take(&mut self.auto_start_next);
        if !auto_start {
            self.original_target = Some(route.last());
        }
        self.route = Some(route.clone());
        self.pending_alternate = None;
        self.following_alternate = false;

        if self.state == MoverState::Running {
            self.splice_onto(route.points());
            return;
        }
        if auto_start {
            if let Err(err) = self.begin(route) {
                debug!(%err, "auto-start refused");
            }
            return;
        }
        self.state = MoverState::AwaitingStart;
    }

    /// Halt immediately and forget the route and any progress on it.
    pub fn on_route_hidden(&mut self) {
        let was_running = self.state == MoverState::Running;
        self.state = MoverState::Idle;
        self.route = None;
        self.path.clear();
        self.next_index = 0;
        self.auto_start_next = false;
        self.pending_alternate = None;
        self.following_alternate = false;
        self.original_target = None;
        if was_running {
            self.events.publish(SimulationEvent::Stopped);
        }
    }

    /// Manual "go". Requires a stored route; a no-op when already running.
    pub fn start(&mut self) -> Result<()> {
        if self.state == MoverState::Running {
            return Ok(());
        }
        let route = self.route.clone().ok_or(NavError::NoActiveRoute)?;
        self.begin(route)
    }

    /// Stop driving; the route stays stored for a later manual start.
    pub fn stop(&mut self) {
        if self.state != MoverState::Running {
            return;
        }
        self.state = MoverState::Idle;
        self.pending_alternate = None;
        info!("simulation stopped");
        self.events.publish(SimulationEvent::Stopped);
    }

    /// Queue a detour route; it is spliced in on the next tick.
    pub fn set_pending_alternate(&mut self, points: Vec<Point>) {
        if !points.is_empty() {
            self.pending_alternate = Some(points);
        }
    }

    /// Advance by `dt` seconds; returns the position afterwards.
    pub fn tick(&mut self, dt: f64) -> Option<Point> {
        if self.state != MoverState::Running {
            return self.position;
        }

        if let Some(alternate) = self.pending_alternate.take() {
            self.splice_onto(&alternate);
            self.following_alternate = true;
            info!(points = alternate.len(), "following alternate route");
        }

        let Some(mut position) = self.position else {
            return None;
        };
        let start = position;
        let mut budget = self.settings.speed * dt.max(0.0);

        let outcome = loop {
            if self.arrived_at_original_target(position) {
                break StepOutcome::Arrived;
            }

            let Some(&target) = self.path.get(self.next_index) else {
                break StepOutcome::Exhausted;
            };

            let remaining = geometry::distance(position, target);
            if remaining > budget {
                position = geometry::move_towards(position, target, budget);
                break StepOutcome::Moving;
            }

            budget -= remaining;
            position = target;
            self.events.publish(SimulationEvent::PointReached {
                index: self.next_index,
                total: self.path.len(),
            });
            self.next_index += 1;
        };

        if let Some(dir) = geometry::normalize(geometry::sub(position, start)) {
            self.heading = Some(dir);
        }
        self.position = Some(position);

        match outcome {
            StepOutcome::Moving => {}
            StepOutcome::Arrived => self.complete(),
            StepOutcome::Exhausted => self.path_exhausted(),
        }
        self.position
    }

    fn begin(&mut self, route: Route) -> Result<()> {
        let path = match (self.position, self.warped_this_session) {
            (Some(position), true) => {
                let index = splice_index(position, self.heading, route.points(), &self.settings);
                splice_path(position, route.points(), index)
            }
            _ => {
                self.position = Some(route.first());
                self.heading = None;
                self.warped_this_session = true;
                route.to_vec()
            }
        };
        if path.len() < 2 {
            return Err(NavError::InvalidRoute { points: path.len() });
        }

        self.path = path;
        self.next_index = 1;
        self.state = MoverState::Running;
        info!(points = self.path.len(), "simulation started");
        self.events.publish(SimulationEvent::Started);
        Ok(())
    }

    fn splice_onto(&mut self, points: &[Point]) {
        let Some(position) = self.position else {
            return;
        };
        if points.is_empty() {
            return;
        }
        let index = splice_index(position, self.heading, points, &self.settings);
        self.path = splice_path(position, points, index);
        self.next_index = 1;
        debug!(splice_index = index, "route spliced at current position");
        self.events.publish(SimulationEvent::RouteSpliced {
            splice_index: index,
        });
    }

    fn arrived_at_original_target(&self, position: Point) -> bool {
        self.following_alternate
            && self.original_target.is_some_and(|target| {
                geometry::distance(position, target) <= self.settings.arrival_tolerance
            })
    }

    fn path_exhausted(&mut self) {
        if self.following_alternate {
            if let Some(route) = self.route.clone() {
                // Detour over: rejoin the stored route
                self.following_alternate = false;
                self.splice_onto(route.points());
                return;
            }
        }
        self.complete();
    }

    fn complete(&mut self) {
        self.state = MoverState::Completed;
        info!(position = ?self.position, "simulation completed");
        self.events.publish(SimulationEvent::Completed);
        self.pending_alternate = None;
        self.following_alternate = false;
        self.path.clear();
        self.next_index = 0;
        self.state = MoverState::Idle;
    }
}

/// Best index of `points` to continue from, seen from `position`.
///
/// Candidates are the points after the segment nearest to `position`, so the
/// mover never doubles back to the part of the route it has already passed.
/// Each candidate scores the alignment of the approach with the route's own
/// direction into that point (the movement `heading` when that segment is
/// degenerate), plus the distance of the nearest candidate relative to its
/// own. Ties keep the lowest index.
pub fn splice_index(
    position: Point,
    heading: Option<Point>,
    points: &[Point],
    settings: &SimulationSettings,
) -> usize {
    let Some(nearest_segment) = geometry::closest_segment(points, position) else {
        return 0;
    };
    let first = nearest_segment + 1;
    let candidates = &points[first..];

    let nearest = candidates
        .iter()
        .map(|&candidate| geometry::distance(position, candidate))
        .fold(f64::INFINITY, f64::min)
        .max(geometry::EPSILON);

    let mut best = (first, f64::NEG_INFINITY);
    for (offset, &candidate) in candidates.iter().enumerate() {
        let index = first + offset;
        let to_candidate = geometry::sub(candidate, position);
        let dist = geometry::length(to_candidate);
        let route_direction =
            geometry::normalize(geometry::sub(candidate, points[index - 1])).or(heading);
        let alignment = match (route_direction, geometry::normalize(to_candidate)) {
            (Some(along), Some(dir)) => geometry::dot(along, dir),
            _ => 0.0,
        };
        let score = settings.splice_alignment_weight * alignment
            + settings.splice_distance_weight * nearest / dist.max(nearest);
        if score > best.1 {
            best = (index, score);
        }
    }
    best.0
}

/// `[position] + points[index..]`
pub fn splice_path(position: Point, points: &[Point], index: usize) -> Vec<Point> {
    let mut path = Vec::with_capacity(points.len() - index.min(points.len()) + 1);
    path.push(position);
    path.extend_from_slice(points.get(index..).unwrap_or(&[]));
    path
}
