//! Seeded "wrong turn" generator for simulation runs.
//!
//! Produces an alternate polyline that leaves the route roughly
//! perpendicular to the current heading, with a little wobble per step. The
//! mover follows it as a detour, which is what exercises deviation detection
//! and recalculation end to end. Same seed, same detours.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::DetourSettings;
use crate::geometry::{self, Point};

/// Turn away from the heading by this many degrees (min, max).
const TURN_RANGE_DEG: (f64, f64) = (60.0, 110.0);
/// Per-step heading wobble (degrees, +/-).
const STEP_WOBBLE_DEG: f64 = 8.0;

#[derive(Debug, Clone)]
pub struct DeviationGenerator {
    settings: DetourSettings,
    rng: ChaCha8Rng,
    armed: bool,
}

impl DeviationGenerator {
    pub fn new(settings: DetourSettings) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(settings.seed),
            armed: settings.enabled,
            settings,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Allow one more detour (called when a user route is set).
    pub fn arm(&mut self) {
        self.armed = self.settings.enabled;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// One detour per arming, once the mover has reached enough points.
    pub fn maybe_generate(
        &mut self,
        points_reached: usize,
        position: Point,
        heading: Option<Point>,
    ) -> Option<Vec<Point>> {
        if !self.armed || points_reached < self.settings.trigger_after_points {
            return None;
        }
        let heading = heading?;
        self.armed = false;
        let detour = self.generate(position, heading);
        info!(points = detour.len(), ?position, "detour generated");
        Some(detour)
    }

    /// Detour polyline starting at `position`.
    ///
    /// Returns just `[position]` when `heading` is degenerate.
    pub fn generate(&mut self, position: Point, heading: Point) -> Vec<Point> {
        let Some(heading) = geometry::normalize(heading) else {
            return vec![position];
        };

        let turn = self.rng.gen_range(TURN_RANGE_DEG.0..=TURN_RANGE_DEG.1);
        let turn = if self.rng.gen_bool(0.5) { turn } else { -turn };
        let mut direction = rotate(heading, turn);

        let steps = self.settings.steps.max(1);
        let step_length = self.settings.length / steps as f64;
        let mut points = Vec::with_capacity(steps + 1);
        let mut current = position;
        points.push(current);
        for _ in 0..steps {
            let wobble = self.rng.gen_range(-STEP_WOBBLE_DEG..=STEP_WOBBLE_DEG);
            direction = rotate(direction, wobble);
            current = geometry::add(current, geometry::scale(direction, step_length));
            points.push(current);
        }
        points
    }
}

/// Rotate `v` counter-clockwise by `degrees`.
fn rotate(v: Point, degrees: f64) -> Point {
    let (sin, cos) = degrees.to_radians().sin_cos();
    (v.0 * cos - v.1 * sin, v.0 * sin + v.1 * cos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DetourSettings {
        DetourSettings {
            enabled: true,
            seed: 7,
            trigger_after_points: 2,
            length: 100.0,
            steps: 5,
        }
    }

    #[test]
    fn test_detour_leaves_heading() {
        let mut generator = DeviationGenerator::new(settings());
        let detour = generator.generate((0.0, 0.0), (1.0, 0.0));
        assert_eq!(detour.len(), 6);
        assert_eq!(detour[0], (0.0, 0.0));

        let first_leg = geometry::sub(detour[1], detour[0]);
        let angle = geometry::angle_between((1.0, 0.0), first_leg).unwrap();
        assert!(angle >= TURN_RANGE_DEG.0 - STEP_WOBBLE_DEG - 1e-9);
        assert!(angle <= TURN_RANGE_DEG.1 + STEP_WOBBLE_DEG + 1e-9);
        assert!((geometry::polyline_length(&detour) - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_same_seed_same_detour() {
        let mut a = DeviationGenerator::new(settings());
        let mut b = DeviationGenerator::new(settings());
        assert_eq!(
            a.generate((3.0, 4.0), (0.0, 1.0)),
            b.generate((3.0, 4.0), (0.0, 1.0))
        );
    }

    #[test]
    fn test_one_detour_per_arming() {
        let mut generator = DeviationGenerator::new(settings());
        assert!(generator.maybe_generate(1, (0.0, 0.0), Some((1.0, 0.0))).is_none());
        assert!(generator.maybe_generate(2, (0.0, 0.0), None).is_none());
        assert!(generator.maybe_generate(2, (0.0, 0.0), Some((1.0, 0.0))).is_some());
        assert!(generator.maybe_generate(5, (0.0, 0.0), Some((1.0, 0.0))).is_none());
        generator.arm();
        assert!(generator.maybe_generate(5, (0.0, 0.0), Some((1.0, 0.0))).is_some());
    }

    #[test]
    fn test_disabled_never_generates() {
        let mut generator = DeviationGenerator::new(DetourSettings::default());
        generator.arm();
        assert!(!generator.is_armed());
        assert!(generator.maybe_generate(10, (0.0, 0.0), Some((1.0, 0.0))).is_none());
    }
}
