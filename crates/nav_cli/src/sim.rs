//! Tick loop driving a Navigator against an asynchronous router.
//!
//! Routing requests leave the navigator through its outbox, run as tokio
//! tasks, and come back over an mpsc channel that is drained at the top of
//! every tick. In lockstep mode the loop waits for outstanding responses
//! before the next tick, which makes runs reproducible.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use nav_core::{
    MoverState, NavEvent, Navigator, Point, RouteEvent, RouteRequest, RouteResponse,
    SimulationEvent,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::router::Router;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub start: Point,
    pub end: Point,
    /// Tick rate (Hz)
    pub tick_hz: f64,
    /// Upper bound on simulated seconds
    pub duration: f64,
    /// Pace ticks in wall-clock time instead of running flat out
    pub realtime: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub elapsed: f64,
    pub completed: bool,
    pub deviations: usize,
    pub recalculations: usize,
    pub failed_recalculations: usize,
    pub final_position: Option<Point>,
    pub average_speed: f64,
}

impl RunSummary {
    fn record(&mut self, event: &NavEvent) {
        match event {
            NavEvent::Route(RouteEvent::CourseDeviationDetected { .. }) => self.deviations += 1,
            NavEvent::Route(RouteEvent::RouteRecalculated) => self.recalculations += 1,
            NavEvent::Route(RouteEvent::RecalculationFailed { .. }) => {
                self.failed_recalculations += 1
            }
            NavEvent::Simulation(SimulationEvent::Completed) => self.completed = true,
            _ => {}
        }
    }
}

/// Run one session: request the route, start the mover once it arrives, and
/// tick until the destination is reached or the time budget runs out.
pub async fn run(
    mut nav: Navigator,
    router: Arc<Router>,
    opts: RunOptions,
    mut sink: impl FnMut(&NavEvent),
) -> Result<RunSummary> {
    if !(opts.tick_hz.is_finite() && opts.tick_hz > 0.0) {
        bail!("tick rate must be positive, got {}", opts.tick_hz);
    }
    let dt = 1.0 / opts.tick_hz;
    let max_ticks = (opts.duration * opts.tick_hz).ceil() as u64;
    let (tx, mut rx) = mpsc::channel::<RouteResponse>(16);
    let mut summary = RunSummary::default();

    nav.request_route(opts.start, opts.end);
    let mut in_flight = dispatch(&mut nav, &router, &tx);
    await_responses(&mut nav, &mut rx, &mut in_flight).await;
    for event in nav.drain_events() {
        summary.record(&event);
        sink(&event);
    }
    if nav.active_route().is_none() {
        bail!("no route from {:?} to {:?}", opts.start, opts.end);
    }

    let mut interval = tokio::time::interval(Duration::from_secs_f64(dt));
    for _ in 0..max_ticks {
        if opts.realtime {
            interval.tick().await;
        }

        while let Ok(response) = rx.try_recv() {
            in_flight = in_flight.saturating_sub(1);
            deliver(&mut nav, response);
        }
        if nav.mover_state() == MoverState::AwaitingStart {
            nav.start_mover_manually()?;
        }

        nav.tick(dt);

        in_flight += dispatch(&mut nav, &router, &tx);
        if !opts.realtime {
            await_responses(&mut nav, &mut rx, &mut in_flight).await;
        }

        for event in nav.drain_events() {
            summary.record(&event);
            sink(&event);
        }
        if summary.completed {
            break;
        }
    }

    summary.ticks = nav.ticks();
    summary.elapsed = nav.elapsed();
    summary.final_position = nav.position();
    summary.average_speed = nav.average_speed();
    info!(
        ticks = summary.ticks,
        completed = summary.completed,
        recalculations = summary.recalculations,
        "run finished"
    );
    Ok(summary)
}

/// Spawn one task per queued request. Returns how many were spawned.
fn dispatch(
    nav: &mut Navigator,
    router: &Arc<Router>,
    tx: &mpsc::Sender<RouteResponse>,
) -> usize {
    let requests = nav.take_route_requests();
    for request in &requests {
        let RouteRequest { seq, start, end, kind } = *request;
        info!(seq, ?kind, "dispatching routing request");
        let router = Arc::clone(router);
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = router.route(start, end).await;
            if tx.send(RouteResponse { seq, result }).await.is_err() {
                warn!(seq, "simulation ended before routing response arrived");
            }
        });
    }
    requests.len()
}

async fn await_responses(
    nav: &mut Navigator,
    rx: &mut mpsc::Receiver<RouteResponse>,
    in_flight: &mut usize,
) {
    while *in_flight > 0 {
        let Some(response) = rx.recv().await else {
            break;
        };
        *in_flight -= 1;
        deliver(nav, response);
    }
}

fn deliver(nav: &mut Navigator, response: RouteResponse) {
    let seq = response.seq;
    if let Err(err) = nav.deliver_route_response(response) {
        warn!(seq, %err, "routing response rejected");
    }
}
