//! Course-deviation debounce
//!
//! Counts *consecutive* samples whose divergence exceeds the angle threshold.
//! A single sample at or below the threshold resets the count, so isolated
//! spikes never fire. Firing is edge-triggered and latched: once fired, the
//! detector stays quiet until [`DeviationDetector::reset`] is called for the
//! next route.

use crate::config::DeviationThresholds;

#[derive(Debug, Clone)]
pub struct DeviationDetector {
    thresholds: DeviationThresholds,
    consecutive: u32,
    fired: bool,
}

impl DeviationDetector {
    pub fn new(thresholds: &DeviationThresholds) -> Self {
        Self {
            thresholds: thresholds.clone(),
            consecutive: 0,
            fired: false,
        }
    }

    /// Observe with the configured thresholds. Returns `true` only on the
    /// transition into the fired state.
    pub fn observe(&mut self, angle_deg: f64) -> bool {
        let DeviationThresholds {
            angle_threshold_deg,
            iteration_threshold,
        } = self.thresholds;
        self.observe_with(angle_deg, angle_threshold_deg, iteration_threshold)
    }

    /// Observe with explicit thresholds.
    pub fn observe_with(&mut self, angle_deg: f64, threshold_deg: f64, iterations: u32) -> bool {
        if angle_deg <= threshold_deg {
            self.consecutive = 0;
            return false;
        }

        self.consecutive = self.consecutive.saturating_add(1);
        if self.fired || self.consecutive < iterations {
            return false;
        }
        self.fired = true;
        true
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
        self.fired = false;
    }
}
