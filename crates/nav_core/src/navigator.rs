//! Orchestration facade
//!
//! Wires the controller, the mover and the detour generator together behind
//! the interface a presentation layer or driver loop talks to. Everything is
//! driven from [`Navigator::tick`]; the only asynchronous boundary is routing,
//! which goes out through [`take_route_requests`](Navigator::take_route_requests)
//! and comes back through [`deliver_route_response`](Navigator::deliver_route_response).

use tracing::{debug, warn};

use crate::config::TrackingConfig;
use crate::controller::{Delivery, RouteController};
use crate::deviation_generator::DeviationGenerator;
use crate::error::Result;
use crate::events::{
    EventQueue, NavEvent, RouteEvent, SimulationEvent, SubscriptionId, Subscribers,
};
use crate::geometry::Point;
use crate::mover::{MoverState, SimulatedMover};
use crate::route::Route;
use crate::routing::{RouteRequest, RouteResponse, RoutingService};

#[derive(Debug)]
pub struct Navigator {
    controller: RouteController,
    mover: SimulatedMover,
    detours: DeviationGenerator,
    subscribers: Subscribers,
    log: EventQueue<NavEvent>,
    elapsed: f64,
    ticks: u64,
    /// Points reached since the last user route; gates the detour.
    points_reached: usize,
    recalculation_announced: bool,
}

impl Navigator {
    /// Build from a validated configuration.
    pub fn new(config: TrackingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            mover: SimulatedMover::new(config.simulation.clone()),
            detours: DeviationGenerator::new(config.detour.clone()),
            controller: RouteController::new(config),
            subscribers: Subscribers::default(),
            log: EventQueue::default(),
            elapsed: 0.0,
            ticks: 0,
            points_reached: 0,
            recalculation_announced: false,
        })
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&NavEvent) + Send + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Publish a route. Fails without side effects on fewer than two points.
    pub fn set_route(&mut self, points: Vec<Point>, is_recalculation: bool) -> Result<()> {
        self.controller.set_route(points, is_recalculation)?;
        self.pump();
        Ok(())
    }

    pub fn hide_route(&mut self) {
        self.controller.hide_route();
        self.pump();
    }

    /// Ask the routing collaborator for a user route.
    pub fn request_route(&mut self, start: Point, end: Point) -> u64 {
        self.controller.request_route(start, end)
    }

    /// Ask for a recalculation from the current position right away.
    pub fn request_recalculation(&mut self) -> Result<u64> {
        self.controller.request_recalculation()
    }

    pub fn start_mover_manually(&mut self) -> Result<()> {
        let result = self.mover.start();
        self.pump();
        result
    }

    pub fn stop_mover(&mut self) {
        self.mover.stop();
        self.pump();
    }

    /// Advance the whole pipeline by `dt` seconds.
    pub fn tick(&mut self, dt: f64) {
        self.ticks += 1;
        self.elapsed += dt.max(0.0);

        let running = self.mover.is_running();
        let position = self.mover.tick(dt);
        if running {
            if let Some(position) = position {
                self.controller.observe(position, self.elapsed);
            }
        }
        self.pump();

        if self.mover.is_running() && !self.mover.is_following_alternate() {
            if let Some(position) = self.mover.position() {
                if let Some(detour) =
                    self.detours
                        .maybe_generate(self.points_reached, position, self.mover.heading())
                {
                    self.mover.set_pending_alternate(detour);
                }
            }
        }
    }

    pub fn take_route_requests(&mut self) -> Vec<RouteRequest> {
        self.controller.take_requests()
    }

    /// Hand a routing result back. Superseded responses are no-ops.
    pub fn deliver_route_response(&mut self, response: RouteResponse) -> Result<Delivery> {
        let result = self.controller.deliver(response);
        self.pump();
        result
    }

    /// Resolve every queued request inline against `service`.
    ///
    /// Returns the number of requests processed. Failures are already
    /// reported through events and logs.
    pub fn resolve_requests_with(&mut self, service: &dyn RoutingService) -> usize {
        let requests = self.take_route_requests();
        for request in &requests {
            let response = RouteResponse::resolve(request, service);
            if let Err(err) = self.deliver_route_response(response) {
                warn!(seq = request.seq, %err, "routing request failed");
            }
        }
        requests.len()
    }

    /// Events emitted since the last drain, in order.
    pub fn drain_events(&mut self) -> Vec<NavEvent> {
        self.log.drain()
    }

    pub fn is_running(&self) -> bool {
        self.mover.is_running()
    }

    pub fn mover_state(&self) -> MoverState {
        self.mover.state()
    }

    pub fn current_segment_index(&self) -> Option<usize> {
        self.controller.current_segment_index()
    }

    pub fn current_segment(&self) -> Option<(Point, Point)> {
        self.controller.current_segment()
    }

    pub fn progress_fraction(&self) -> f64 {
        self.controller.progress_fraction()
    }

    pub fn position(&self) -> Option<Point> {
        self.mover.position()
    }

    pub fn active_route(&self) -> Option<&Route> {
        self.controller.active_route()
    }

    pub fn destination(&self) -> Option<Point> {
        self.controller.destination()
    }

    pub fn average_speed(&self) -> f64 {
        self.controller.average_speed()
    }

    pub fn is_following_detour(&self) -> bool {
        self.mover.is_following_alternate()
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn config(&self) -> &TrackingConfig {
        self.controller.config()
    }

    /// Move pending events between components until both are quiet, then
    /// fan them out to subscribers.
    fn pump(&mut self) {
        loop {
            let route_events = self.controller.drain_events();
            for event in &route_events {
                self.forward_to_mover(event);
            }
            let sim_events = self.mover.drain_events();
            for event in &sim_events {
                self.react_to_simulation(event);
            }

            if route_events.is_empty() && sim_events.is_empty() {
                break;
            }
            for event in route_events {
                self.emit(event.into());
            }
            for event in sim_events {
                self.emit(event.into());
            }
        }
    }

    fn forward_to_mover(&mut self, event: &RouteEvent) {
        match event {
            RouteEvent::RouteRecalculated => {
                self.recalculation_announced = true;
                self.mover.on_route_recalculated();
            }
            RouteEvent::RouteAvailable { points } => {
                if !std::mem::take(&mut self.recalculation_announced) {
                    self.points_reached = 0;
                    self.detours.arm();
                }
                match Route::new(points.clone()) {
                    Ok(route) => self.mover.on_route_available(route),
                    Err(err) => warn!(%err, "route event carried an invalid route"),
                }
            }
            RouteEvent::RouteHidden => {
                self.mover.on_route_hidden();
                self.detours.disarm();
            }
            RouteEvent::CourseDeviationDetected { .. }
            | RouteEvent::SegmentChanged { .. }
            | RouteEvent::RecalculationFailed { .. } => {}
        }
    }

    fn react_to_simulation(&mut self, event: &SimulationEvent) {
        match event {
            SimulationEvent::Started | SimulationEvent::Stopped => {
                self.controller.reset_tracking();
            }
            SimulationEvent::PointReached { .. } => self.points_reached += 1,
            // Run is over; a late recalculation must not restart it
            SimulationEvent::Completed => self.controller.abandon_requests(),
            SimulationEvent::RouteSpliced { .. } => {}
        }
    }

    fn emit(&mut self, event: NavEvent) {
        debug!(?event, "nav event");
        self.subscribers.notify(&event);
        self.log.publish(event);
    }
}
