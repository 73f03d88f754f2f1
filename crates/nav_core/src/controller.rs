//! Route lifecycle controller
//!
//! Owns the single active route and everything derived from it: segment
//! cursor, deviation state, speed/displacement windows. Route replacement
//! happens inside one `&mut self` call, so no reader ever sees a half-swapped
//! route.
//!
//! ## Per-tick pipeline ([`RouteController::observe`])
//!
//! ```text
//! position ─► SpeedSampler ──rejected──► invalidate cursor, clear window, stop
//!                │
//!                ▼
//!          SegmentTracker ─► DisplacementWindow ─► gate ─► divergence
//!                                                            │
//!                                                            ▼
//!                                                   DeviationDetector
//!                                                            │ fired
//!                                                            ▼
//!                                          recalculation request (pos → target)
//! ```
//!
//! Recalculation targets the destination of the last user route, never the
//! original start.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::config::TrackingConfig;
use crate::deviation::DeviationDetector;
use crate::direction::{self, DisplacementCheck};
use crate::error::{NavError, Result, RoutingError};
use crate::events::{EventQueue, RouteEvent};
use crate::geometry::Point;
use crate::route::Route;
use crate::routing::{RequestKind, RequestSequencer, RouteRequest, RouteResponse};
use crate::sampler::{DisplacementWindow, SpeedSample, SpeedSampler};
use crate::segment_tracker::{Advance, SegmentTracker};

#[derive(Debug, Clone)]
struct ActiveRoute {
    route: Route,
    destination: Point,
}

/// What one observed position did to the tracking state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// No active route; nothing tracked.
    Untracked,
    /// Sample rejected as an outlier; cursor will be re-found by full scan.
    Outlier,
    /// Direction check skipped (warming up, too little movement, degenerate
    /// geometry, or already fired).
    Skipped { segment_index: usize },
    /// Divergence evaluated.
    Evaluated {
        segment_index: usize,
        angle_deg: f64,
        fired: bool,
    },
}

/// Result of handing a routing response to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Response belonged to an older request and was dropped.
    Superseded,
    /// Route installed.
    Installed { recalculated: bool },
}

#[derive(Debug)]
pub struct RouteController {
    config: TrackingConfig,
    active: Option<ActiveRoute>,
    tracker: SegmentTracker,
    detector: DeviationDetector,
    sampler: SpeedSampler,
    window: DisplacementWindow,
    sequencer: RequestSequencer,
    requests: VecDeque<RouteRequest>,
    events: EventQueue<RouteEvent>,
    last_position: Option<Point>,
}

impl RouteController {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            tracker: SegmentTracker::new(&config.segment),
            detector: DeviationDetector::new(&config.deviation),
            sampler: SpeedSampler::new(&config.sampler),
            window: DisplacementWindow::new(config.movement.displacement_lag_ticks),
            config,
            active: None,
            sequencer: RequestSequencer::default(),
            requests: VecDeque::new(),
            events: EventQueue::default(),
            last_position: None,
        }
    }

    /// Publish `points` as the active route.
    ///
    /// A user route (`is_recalculation == false`) sets the destination to its
    /// last point. A recalculated route keeps the current destination. Either
    /// way it supersedes any pending routing request.
    pub fn set_route(&mut self, points: Vec<Point>, is_recalculation: bool) -> Result<()> {
        let route = Route::new(points)?;
        self.abandon_requests();
        self.install(route, is_recalculation);
        Ok(())
    }

    /// Drop the active route and every pending request.
    pub fn hide_route(&mut self) {
        if self.active.take().is_some() {
            info!("route hidden");
        }
        self.tracker.clear();
        self.abandon_requests();
        self.reset_tracking();
        self.events.publish(RouteEvent::RouteHidden);
    }

    /// Queue a user route request from `start` to `end`.
    pub fn request_route(&mut self, start: Point, end: Point) -> u64 {
        self.issue(RequestKind::Initial, start, end)
    }

    /// Queue a recalculation from the last observed position to the
    /// destination.
    pub fn request_recalculation(&mut self) -> Result<u64> {
        let destination = self
            .active
            .as_ref()
            .map(|a| a.destination)
            .ok_or(NavError::NoActiveRoute)?;
        let from = self.last_position.ok_or(NavError::NoPosition)?;
        Ok(self.issue(RequestKind::Recalculation, from, destination))
    }

    /// Forget queued and in-flight requests; late responses are dropped.
    pub fn abandon_requests(&mut self) {
        if let Some((seq, kind)) = self.sequencer.pending() {
            debug!(seq, ?kind, "abandoning routing request");
        }
        self.sequencer.abandon();
        self.requests.clear();
    }

    /// Clear deviation and sampling state; keeps the route and cursor.
    pub fn reset_tracking(&mut self) {
        self.detector.reset();
        self.sampler.reset();
        self.window.clear();
    }

    /// Feed the position observed at time `now` (seconds).
    pub fn observe(&mut self, position: Point, now: f64) -> Observation {
        self.last_position = Some(position);
        if self.active.is_none() {
            return Observation::Untracked;
        }

        if let SpeedSample::Rejected { speed } = self.sampler.update(position, now) {
            debug!(speed, "outlier position, re-seeking segment");
            self.window.clear();
            self.tracker.invalidate();
            self.advance_tracker(position);
            return Observation::Outlier;
        }

        let Some(segment_index) = self.advance_tracker(position) else {
            return Observation::Untracked;
        };
        self.window.push(position);

        let skipped = Observation::Skipped { segment_index };
        if self.detector.has_fired() || self.sequencer.is_pending() {
            return skipped;
        }
        if !self
            .sampler
            .has_sufficient_data(self.config.sampler.min_samples)
        {
            return skipped;
        }
        let Some((c, d, ticks)) = self.window.pair() else {
            return skipped;
        };
        match direction::check_displacement(c, d, ticks, &self.config.movement) {
            DisplacementCheck::Usable { .. } => {}
            DisplacementCheck::Implausible { moved, limit } => {
                debug!(moved, limit, "implausible displacement, skipping direction check");
                return skipped;
            }
            DisplacementCheck::TooSmall { .. } => return skipped,
        }
        let Some((a, b)) = self.tracker.current_segment() else {
            return skipped;
        };
        let Some(angle_deg) = direction::divergence(a, b, c, d) else {
            return skipped;
        };

        let fired = self.detector.observe(angle_deg);
        if fired {
            info!(segment_index, angle_deg, "course deviation detected");
            self.events.publish(RouteEvent::CourseDeviationDetected {
                segment_index,
                angle_deg,
            });
            if let Err(err) = self.request_recalculation() {
                warn!(%err, "could not request recalculation");
            }
        }
        Observation::Evaluated {
            segment_index,
            angle_deg,
            fired,
        }
    }

    /// Apply a routing response.
    ///
    /// Superseded responses are dropped silently. A failed response leaves the
    /// active route and tracking state untouched and is returned as an error.
    pub fn deliver(&mut self, response: RouteResponse) -> Result<Delivery> {
        let Some(kind) = self.sequencer.complete(response.seq) else {
            info!(seq = response.seq, "dropping superseded routing response");
            return Ok(Delivery::Superseded);
        };
        let recalculated = kind == RequestKind::Recalculation;

        let route = response
            .result
            .and_then(|points| {
                Route::new(points).map_err(|err| match err {
                    NavError::InvalidRoute { points } => RoutingError::TooFewPoints { points },
                    other => RoutingError::InvalidResponse(other.to_string()),
                })
            });

        match route {
            Ok(route) => {
                self.install(route, recalculated);
                Ok(Delivery::Installed { recalculated })
            }
            Err(err) => {
                warn!(seq = response.seq, %err, ?kind, "routing request failed");
                if recalculated {
                    self.events.publish(RouteEvent::RecalculationFailed {
                        reason: err.to_string(),
                    });
                }
                Err(err.into())
            }
        }
    }

    pub fn take_requests(&mut self) -> Vec<RouteRequest> {
        self.requests.drain(..).collect()
    }

    pub fn drain_events(&mut self) -> Vec<RouteEvent> {
        self.events.drain()
    }

    pub fn active_route(&self) -> Option<&Route> {
        self.active.as_ref().map(|a| &a.route)
    }

    pub fn destination(&self) -> Option<Point> {
        self.active.as_ref().map(|a| a.destination)
    }

    pub fn current_segment_index(&self) -> Option<usize> {
        self.tracker.current_index()
    }

    pub fn current_segment(&self) -> Option<(Point, Point)> {
        self.tracker.current_segment()
    }

    pub fn progress_fraction(&self) -> f64 {
        self.tracker.progress_fraction()
    }

    pub fn average_speed(&self) -> f64 {
        self.sampler.average()
    }

    pub fn deviation_fired(&self) -> bool {
        self.detector.has_fired()
    }

    pub fn pending_request(&self) -> Option<(u64, RequestKind)> {
        self.sequencer.pending()
    }

    pub fn last_position(&self) -> Option<Point> {
        self.last_position
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    fn issue(&mut self, kind: RequestKind, start: Point, end: Point) -> u64 {
        let seq = self.sequencer.issue(kind);
        info!(seq, ?kind, ?start, ?end, "routing request issued");
        self.requests.push_back(RouteRequest {
            seq,
            start,
            end,
            kind,
        });
        seq
    }

    fn install(&mut self, route: Route, recalculated: bool) {
        let destination = match (&self.active, recalculated) {
            (Some(active), true) => active.destination,
            _ => route.last(),
        };
        info!(
            points = route.len(),
            length = route.total_length(),
            recalculated,
            "route installed"
        );

        self.tracker.reset(route.clone());
        self.reset_tracking();
        let points = route.to_vec();
        self.active = Some(ActiveRoute { route, destination });

        if recalculated {
            self.events.publish(RouteEvent::RouteRecalculated);
        }
        self.events.publish(RouteEvent::RouteAvailable { points });
        self.publish_segment();
    }

    fn advance_tracker(&mut self, position: Point) -> Option<usize> {
        let outcome = self.tracker.advance(position);
        if outcome.changed() {
            self.publish_segment();
        }
        match outcome {
            Advance::NoRoute => None,
            other => other.index(),
        }
    }

    fn publish_segment(&mut self) {
        if let (Some(index), Some((start, end))) =
            (self.tracker.current_index(), self.tracker.current_segment())
        {
            self.events
                .publish(RouteEvent::SegmentChanged { index, start, end });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TrackingConfig {
        let mut config = TrackingConfig::default();
        config.sampler.min_samples = 1;
        config.movement.displacement_lag_ticks = 2;
        config.movement.min_movement = 0.5;
        config.movement.max_movement_per_tick = 5.0;
        config.deviation.iteration_threshold = 3;
        config
    }

    fn straight() -> Vec<Point> {
        vec![(0.0, 0.0), (100.0, 0.0), (200.0, 0.0)]
    }

    /// Drive `count` ticks from `from` by `step` per tick, starting at `t0`.
    fn drive(
        ctl: &mut RouteController,
        from: Point,
        step: Point,
        count: usize,
        t0: f64,
    ) -> Vec<Observation> {
        (0..count)
            .map(|i| {
                let k = i as f64;
                ctl.observe((from.0 + step.0 * k, from.1 + step.1 * k), t0 + k * 0.1)
            })
            .collect()
    }

    #[test]
    fn test_set_route_emits_available_with_same_points() {
        let mut ctl = RouteController::new(config());
        ctl.set_route(straight(), false).unwrap();
        let events = ctl.drain_events();
        assert_eq!(
            events[0],
            RouteEvent::RouteAvailable { points: straight() }
        );
        assert!(matches!(events[1], RouteEvent::SegmentChanged { index: 0, .. }));
        assert_eq!(ctl.destination(), Some((200.0, 0.0)));
    }

    #[test]
    fn test_invalid_route_changes_nothing() {
        let mut ctl = RouteController::new(config());
        ctl.set_route(straight(), false).unwrap();
        ctl.drain_events();
        assert_eq!(
            ctl.set_route(vec![(1.0, 1.0)], false),
            Err(NavError::InvalidRoute { points: 1 })
        );
        assert_eq!(ctl.active_route().unwrap().len(), 3);
        assert!(ctl.drain_events().is_empty());
    }

    #[test]
    fn test_on_course_never_fires() {
        let mut ctl = RouteController::new(config());
        ctl.set_route(straight(), false).unwrap();
        let obs = drive(&mut ctl, (0.0, 0.0), (1.0, 0.0), 50, 0.0);
        assert!(obs.iter().all(|o| !matches!(o, Observation::Evaluated { fired: true, .. })));
        assert!(obs.iter().any(|o| matches!(o, Observation::Evaluated { .. })));
        assert!(ctl.take_requests().is_empty());
    }

    #[test]
    fn test_sustained_deviation_requests_recalculation_once() {
        let mut ctl = RouteController::new(config());
        ctl.set_route(straight(), false).unwrap();
        drive(&mut ctl, (0.0, 0.0), (1.0, 0.0), 10, 0.0);
        // Turn 90 degrees off the route
        let obs = drive(&mut ctl, (10.0, 1.0), (0.0, 1.0), 20, 1.0);

        let fired = obs
            .iter()
            .filter(|o| matches!(o, Observation::Evaluated { fired: true, .. }))
            .count();
        assert_eq!(fired, 1);

        let requests = ctl.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, RequestKind::Recalculation);
        assert_eq!(requests[0].end, (200.0, 0.0));
        // From the position at the moment of firing, not the route start
        assert!(requests[0].start.1 > 0.0);

        let events = ctl.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, RouteEvent::CourseDeviationDetected { .. })));
    }

    #[test]
    fn test_recalculated_route_resets_tracking() {
        let mut ctl = RouteController::new(config());
        ctl.set_route(straight(), false).unwrap();
        drive(&mut ctl, (0.0, 0.0), (1.0, 0.0), 10, 0.0);
        drive(&mut ctl, (10.0, 1.0), (0.0, 1.0), 20, 1.0);
        let request = ctl.take_requests().remove(0);
        assert!(ctl.deviation_fired());
        ctl.drain_events();

        let delivery = ctl
            .deliver(RouteResponse {
                seq: request.seq,
                result: Ok(vec![request.start, (10.0, 0.0), (200.0, 0.0)]),
            })
            .unwrap();
        assert_eq!(delivery, Delivery::Installed { recalculated: true });
        assert!(!ctl.deviation_fired());
        assert_eq!(ctl.current_segment_index(), Some(0));
        assert_eq!(ctl.destination(), Some((200.0, 0.0)));

        let events = ctl.drain_events();
        assert_eq!(events[0], RouteEvent::RouteRecalculated);
        assert!(matches!(events[1], RouteEvent::RouteAvailable { .. }));
    }

    #[test]
    fn test_superseded_response_is_dropped() {
        let mut ctl = RouteController::new(config());
        let first = ctl.request_route((0.0, 0.0), (50.0, 0.0));
        let second = ctl.request_route((0.0, 0.0), (80.0, 0.0));

        let stale = ctl.deliver(RouteResponse {
            seq: first,
            result: Ok(vec![(0.0, 0.0), (50.0, 0.0)]),
        });
        assert_eq!(stale, Ok(Delivery::Superseded));
        assert!(ctl.active_route().is_none());

        ctl.deliver(RouteResponse {
            seq: second,
            result: Ok(vec![(0.0, 0.0), (80.0, 0.0)]),
        })
        .unwrap();
        assert_eq!(ctl.destination(), Some((80.0, 0.0)));
    }

    #[test]
    fn test_failed_recalculation_keeps_route() {
        let mut ctl = RouteController::new(config());
        ctl.set_route(straight(), false).unwrap();
        ctl.observe((5.0, 0.0), 0.0);
        let seq = ctl.request_recalculation().unwrap();
        ctl.drain_events();

        let result = ctl.deliver(RouteResponse {
            seq,
            result: Err(RoutingError::Transport("connection reset".into())),
        });
        assert!(matches!(result, Err(NavError::Routing(RoutingError::Transport(_)))));
        assert_eq!(ctl.active_route().unwrap().to_vec(), straight());
        assert!(matches!(
            ctl.drain_events().as_slice(),
            [RouteEvent::RecalculationFailed { .. }]
        ));
    }

    #[test]
    fn test_short_route_response_is_a_failure() {
        let mut ctl = RouteController::new(config());
        let seq = ctl.request_route((0.0, 0.0), (1.0, 0.0));
        let result = ctl.deliver(RouteResponse {
            seq,
            result: Ok(vec![(0.0, 0.0)]),
        });
        assert_eq!(
            result,
            Err(NavError::Routing(RoutingError::TooFewPoints { points: 1 }))
        );
        assert!(ctl.active_route().is_none());
    }

    #[test]
    fn test_outlier_triggers_full_scan() {
        let mut ctl = RouteController::new(config());
        ctl.set_route(vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0)], false)
            .unwrap();
        ctl.observe((0.0, 0.0), 0.0);
        ctl.observe((1.0, 0.0), 0.1);
        // Jump onto the second segment far faster than plausible
        assert_eq!(ctl.observe((100.0, 60.0), 0.2), Observation::Outlier);
        assert_eq!(ctl.current_segment_index(), Some(1));
    }

    #[test]
    fn test_hide_route_drops_pending_request() {
        let mut ctl = RouteController::new(config());
        ctl.set_route(straight(), false).unwrap();
        ctl.observe((1.0, 0.0), 0.0);
        let seq = ctl.request_recalculation().unwrap();
        ctl.hide_route();

        assert!(ctl.active_route().is_none());
        assert!(ctl.take_requests().is_empty());
        let late = ctl.deliver(RouteResponse {
            seq,
            result: Ok(straight()),
        });
        assert_eq!(late, Ok(Delivery::Superseded));
        assert!(ctl.active_route().is_none());
        assert_eq!(ctl.observe((1.0, 0.0), 1.0), Observation::Untracked);
    }

    #[test]
    fn test_published_recalculation_supersedes_pending_request() {
        let mut ctl = RouteController::new(config());
        ctl.set_route(straight(), false).unwrap();
        ctl.observe((5.0, 0.0), 0.0);
        let seq = ctl.request_recalculation().unwrap();

        let detour = vec![(5.0, 0.0), (5.0, 50.0), (200.0, 0.0)];
        ctl.set_route(detour.clone(), true).unwrap();
        assert_eq!(ctl.pending_request(), None);
        assert!(ctl.take_requests().is_empty());

        let late = ctl.deliver(RouteResponse {
            seq,
            result: Ok(vec![(5.0, 0.0), (200.0, 0.0)]),
        });
        assert_eq!(late, Ok(Delivery::Superseded));
        assert_eq!(ctl.active_route().unwrap().to_vec(), detour);
        assert_eq!(ctl.destination(), Some((200.0, 0.0)));
    }

    #[test]
    fn test_recalculation_needs_route_and_position() {
        let mut ctl = RouteController::new(config());
        assert_eq!(ctl.request_recalculation(), Err(NavError::NoActiveRoute));
        ctl.set_route(straight(), false).unwrap();
        assert_eq!(ctl.request_recalculation(), Err(NavError::NoPosition));
    }
}
