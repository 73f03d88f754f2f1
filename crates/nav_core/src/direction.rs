//! Route heading vs. actual movement heading.
//!
//! [`divergence`] is pure; gating the displacement is the caller's policy and
//! lives in [`check_displacement`] so the controller and tests share one rule.

use crate::config::MovementThresholds;
use crate::geometry::{self, Point};

/// Angle (degrees) between the route vector `B - A` and the displacement
/// `D - C`. `None` when either vector is degenerate.
pub fn divergence(a: Point, b: Point, c: Point, d: Point) -> Option<f64> {
    geometry::angle_between(geometry::sub(b, a), geometry::sub(d, c))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplacementCheck {
    /// Moved too little for the displacement to carry a direction.
    TooSmall { moved: f64 },
    /// Moved further than plausible for the elapsed ticks.
    Implausible { moved: f64, limit: f64 },
    Usable { moved: f64 },
}

impl DisplacementCheck {
    pub fn is_usable(&self) -> bool {
        matches!(self, DisplacementCheck::Usable { .. })
    }
}

/// Classify the displacement `C -> D` observed over `ticks` ticks.
pub fn check_displacement(
    c: Point,
    d: Point,
    ticks: usize,
    thresholds: &MovementThresholds,
) -> DisplacementCheck {
    let moved = geometry::distance(c, d);
    if moved <= thresholds.min_movement {
        return DisplacementCheck::TooSmall { moved };
    }
    let limit = thresholds.max_movement_per_tick * ticks.max(1) as f64;
    if moved > limit {
        return DisplacementCheck::Implausible { moved, limit };
    }
    DisplacementCheck::Usable { moved }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divergence_aligned_and_reversed() {
        let a = (0.0, 0.0);
        let b = (10.0, 0.0);
        assert!(divergence(a, b, (2.0, 1.0), (5.0, 1.0)).unwrap() < 1e-6);
        assert!((divergence(a, b, (5.0, 1.0), (2.0, 1.0)).unwrap() - 180.0).abs() < 1e-6);
        assert!((divergence(a, b, (5.0, 0.0), (5.0, 4.0)).unwrap() - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_divergence_degenerate_route_segment() {
        assert!(divergence((1.0, 1.0), (1.0, 1.0), (0.0, 0.0), (3.0, 0.0)).is_none());
    }

    #[test]
    fn test_displacement_gate() {
        let t = MovementThresholds {
            displacement_lag_ticks: 10,
            min_movement: 1.0,
            max_movement_per_tick: 2.0,
        };
        assert!(matches!(
            check_displacement((0.0, 0.0), (0.5, 0.0), 10, &t),
            DisplacementCheck::TooSmall { .. }
        ));
        assert!(check_displacement((0.0, 0.0), (15.0, 0.0), 10, &t).is_usable());
        assert_eq!(
            check_displacement((0.0, 0.0), (25.0, 0.0), 10, &t),
            DisplacementCheck::Implausible {
                moved: 25.0,
                limit: 20.0
            }
        );
    }
}
