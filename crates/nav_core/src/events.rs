//! Typed events and their plumbing.
//!
//! Each emitting component owns an [`EventQueue`] and publishes into it; the
//! owner drains it once per tick. The [`Navigator`](crate::navigator::Navigator)
//! forwards everything to presentation callbacks registered in
//! [`Subscribers`].

use std::collections::VecDeque;

use serde::Serialize;
use tracing::warn;

use crate::geometry::Point;

/// Emitted by the route lifecycle controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteEvent {
    RouteAvailable {
        points: Vec<Point>,
    },
    /// Precedes the `RouteAvailable` of a recalculated route.
    RouteRecalculated,
    RouteHidden,
    CourseDeviationDetected {
        segment_index: usize,
        angle_deg: f64,
    },
    SegmentChanged {
        index: usize,
        start: Point,
        end: Point,
    },
    RecalculationFailed {
        reason: String,
    },
}

/// Emitted by the simulated mover.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimulationEvent {
    Started,
    Stopped,
    Completed,
    PointReached { index: usize, total: usize },
    RouteSpliced { splice_index: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", content = "event", rename_all = "snake_case")]
pub enum NavEvent {
    Route(RouteEvent),
    Simulation(SimulationEvent),
}

impl From<RouteEvent> for NavEvent {
    fn from(event: RouteEvent) -> Self {
        NavEvent::Route(event)
    }
}

impl From<SimulationEvent> for NavEvent {
    fn from(event: SimulationEvent) -> Self {
        NavEvent::Simulation(event)
    }
}

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Bounded outbox; the oldest event is dropped when full.
#[derive(Debug, Clone)]
pub struct EventQueue<E> {
    events: VecDeque<E>,
    max_pending: usize,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl<E> EventQueue<E> {
    pub fn new(max_pending: usize) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            events: VecDeque::with_capacity(max_pending.min(64)),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: E) {
        if self.events.len() >= self.max_pending {
            warn!(max_pending = self.max_pending, "event queue full, dropping oldest");
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<E> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&NavEvent) + Send>;

/// Presentation callbacks, invoked in registration order.
#[derive(Default)]
pub struct Subscribers {
    next_id: u64,
    callbacks: Vec<(SubscriptionId, Callback)>,
}

impl Subscribers {
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&NavEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Returns `false` if the id was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(sid, _)| *sid != id);
        self.callbacks.len() != before
    }

    pub fn notify(&mut self, event: &NavEvent) {
        for (_, callback) in self.callbacks.iter_mut() {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let mut queue = EventQueue::new(2);
        queue.publish(SimulationEvent::Started);
        queue.publish(SimulationEvent::PointReached { index: 1, total: 3 });
        queue.publish(SimulationEvent::Completed);
        assert_eq!(
            queue.drain(),
            vec![
                SimulationEvent::PointReached { index: 1, total: 3 },
                SimulationEvent::Completed
            ]
        );
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Subscribers::default();

        let sink = Arc::clone(&seen);
        let id = subs.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        subs.notify(&NavEvent::Route(RouteEvent::RouteHidden));

        assert!(subs.unsubscribe(id));
        assert!(!subs.unsubscribe(id));
        subs.notify(&NavEvent::Simulation(SimulationEvent::Stopped));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![NavEvent::Route(RouteEvent::RouteHidden)]
        );
        assert!(subs.is_empty());
    }

    #[test]
    fn test_event_json_shape() {
        let event = NavEvent::from(SimulationEvent::PointReached { index: 2, total: 5 });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["source"], "simulation");
        assert_eq!(json["event"]["type"], "point_reached");
        assert_eq!(json["event"]["total"], 5);
    }
}
