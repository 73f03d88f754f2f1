//! Immutable route polyline
//!
//! A [`Route`] is published once and never mutated; recalculation builds a
//! new one. Cloning is cheap (shared buffer), so the tracker, the mover and
//! event payloads can hold the same route without copying points.

use std::sync::Arc;

use crate::error::{NavError, Result};
use crate::geometry::{self, Point};

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    points: Arc<[Point]>,
    /// `cumulative[i]` = length from the first point to point `i`
    cumulative: Arc<[f64]>,
}

impl Route {
    /// Build a route; fewer than two points is rejected.
    pub fn new(points: Vec<Point>) -> Result<Self> {
        if points.len() < 2 {
            return Err(NavError::InvalidRoute {
                points: points.len(),
            });
        }

        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for w in points.windows(2) {
            total += geometry::distance(w[0], w[1]);
            cumulative.push(total);
        }

        Ok(Self {
            points: points.into(),
            cumulative: cumulative.into(),
        })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn to_vec(&self) -> Vec<Point> {
        self.points.to_vec()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn segment_count(&self) -> usize {
        self.points.len() - 1
    }

    /// Endpoints of segment `index`, if it exists.
    pub fn segment(&self, index: usize) -> Option<(Point, Point)> {
        if index + 1 < self.points.len() {
            Some((self.points[index], self.points[index + 1]))
        } else {
            None
        }
    }

    pub fn first(&self) -> Point {
        self.points[0]
    }

    pub fn last(&self) -> Point {
        self.points[self.points.len() - 1]
    }

    pub fn total_length(&self) -> f64 {
        self.cumulative[self.cumulative.len() - 1]
    }

    /// Length from the start of the route to the start of segment `index`.
    pub fn length_before(&self, index: usize) -> f64 {
        self.cumulative
            .get(index)
            .copied()
            .unwrap_or_else(|| self.total_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_short_routes() {
        assert_eq!(Route::new(vec![]), Err(NavError::InvalidRoute { points: 0 }));
        assert_eq!(
            Route::new(vec![(1.0, 1.0)]),
            Err(NavError::InvalidRoute { points: 1 })
        );
    }

    #[test]
    fn test_segments_and_lengths() {
        let route = Route::new(vec![(0.0, 0.0), (3.0, 4.0), (3.0, 4.0), (3.0, 10.0)]).unwrap();
        assert_eq!(route.segment_count(), 3);
        assert_eq!(route.segment(1), Some(((3.0, 4.0), (3.0, 4.0))));
        assert_eq!(route.segment(3), None);
        assert!((route.total_length() - 11.0).abs() < 1e-9);
        assert!((route.length_before(2) - 5.0).abs() < 1e-9);
        assert!((route.length_before(99) - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_points_preserved_in_order() {
        let pts = vec![(0.0, 0.0), (5.0, 0.0), (5.0, 5.0)];
        let route = Route::new(pts.clone()).unwrap();
        assert_eq!(route.to_vec(), pts);
        assert_eq!(route.first(), (0.0, 0.0));
        assert_eq!(route.last(), (5.0, 5.0));
    }
}
