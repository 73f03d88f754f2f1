//! Segment cursor over the active route
//!
//! Sequential tracking moves the cursor forward at most one segment per call,
//! and only when the point is at least `progress_threshold` along the current
//! segment AND physically no further from the next segment than from the
//! current one. The second check keeps sharp bends from advancing early: the
//! projection onto the current segment's line can exceed the threshold while
//! the point is still sitting on the old segment.
//!
//! When the cursor is invalid (fresh tracker, or invalidated after a warp) a
//! full scan picks the closest segment, lowest index on ties.

use tracing::debug;

use crate::config::SegmentThresholds;
use crate::geometry::{self, Point};
use crate::route::Route;

/// Result of one [`SegmentTracker::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    NoRoute,
    Stayed(usize),
    /// Sequential move to the next segment
    Advanced { from: usize, to: usize },
    /// Fallback scan placed the cursor (may jump arbitrarily)
    Relocated(usize),
}

impl Advance {
    pub fn index(&self) -> Option<usize> {
        match *self {
            Advance::NoRoute => None,
            Advance::Stayed(i) | Advance::Relocated(i) => Some(i),
            Advance::Advanced { to, .. } => Some(to),
        }
    }

    pub fn changed(&self) -> bool {
        matches!(self, Advance::Advanced { .. } | Advance::Relocated(_))
    }
}

#[derive(Debug, Clone)]
pub struct SegmentTracker {
    route: Option<Route>,
    cursor: Option<usize>,
    progress_threshold: f64,
    progress_fraction: f64,
}

impl SegmentTracker {
    pub fn new(thresholds: &SegmentThresholds) -> Self {
        Self {
            route: None,
            cursor: None,
            progress_threshold: thresholds.progress_threshold,
            progress_fraction: 0.0,
        }
    }

    /// Track a new route from its first segment.
    pub fn reset(&mut self, route: Route) {
        self.route = Some(route);
        self.cursor = Some(0);
        self.progress_fraction = 0.0;
    }

    pub fn clear(&mut self) {
        self.route = None;
        self.cursor = None;
        self.progress_fraction = 0.0;
    }

    /// Force the next [`advance`](Self::advance) to run the fallback scan.
    pub fn invalidate(&mut self) {
        self.cursor = None;
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    /// Current segment index, if the cursor is valid for the tracked route.
    pub fn current_index(&self) -> Option<usize> {
        let route = self.route.as_ref()?;
        self.cursor.filter(|&i| i < route.segment_count())
    }

    pub fn current_segment(&self) -> Option<(Point, Point)> {
        let route = self.route.as_ref()?;
        route.segment(self.current_index()?)
    }

    /// Fraction of the route length covered at the last `advance`, in `[0, 1]`.
    pub fn progress_fraction(&self) -> f64 {
        self.progress_fraction
    }

    pub fn advance(&mut self, position: Point) -> Advance {
        let Some(route) = self.route.as_ref() else {
            return Advance::NoRoute;
        };

        let outcome = match self.cursor.filter(|&i| i < route.segment_count()) {
            None => {
                let Some(index) = geometry::closest_segment(route.points(), position) else {
                    return Advance::NoRoute;
                };
                debug!(index, "segment cursor relocated by full scan");
                Advance::Relocated(index)
            }
            Some(index) => self.sequential_step(route, index, position),
        };

        if let Some(index) = outcome.index() {
            self.cursor = Some(index);
            self.progress_fraction = overall_progress(route, index, position);
        }
        outcome
    }

    fn sequential_step(&self, route: &Route, index: usize, position: Point) -> Advance {
        let Some((start, end)) = route.segment(index) else {
            return Advance::Stayed(index);
        };
        let Some((next_start, next_end)) = route.segment(index + 1) else {
            return Advance::Stayed(index);
        };

        let progress = geometry::segment_progress(position, start, end);
        if progress < self.progress_threshold {
            return Advance::Stayed(index);
        }

        let current_distance = geometry::distance_to_segment(position, start, end);
        let next_distance = geometry::distance_to_segment(position, next_start, next_end);
        if next_distance > current_distance {
            return Advance::Stayed(index);
        }

        debug!(from = index, to = index + 1, progress, "segment advanced");
        Advance::Advanced {
            from: index,
            to: index + 1,
        }
    }
}

fn overall_progress(route: &Route, index: usize, position: Point) -> f64 {
    let total = route.total_length();
    if total < geometry::EPSILON {
        return 1.0;
    }
    let Some((start, end)) = route.segment(index) else {
        return 1.0;
    };
    let along = geometry::segment_progress(position, start, end).clamp(0.0, 1.0)
        * geometry::distance(start, end);
    ((route.length_before(index) + along) / total).clamp(0.0, 1.0)
}
