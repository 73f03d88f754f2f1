//! Rolling movement statistics with outlier filtering
//!
//! [`SpeedSampler`] keeps a bounded FIFO of accepted instantaneous speeds.
//! Samples implying an implausible speed (teleports, warps after a splice)
//! are rejected without touching state, so one glitch never poisons the
//! average.
//!
//! [`DisplacementWindow`] keeps the last `lag + 1` positions so callers can
//! compare the position `lag` ticks ago (C) with the current one (D).

use std::collections::VecDeque;

use tracing::debug;

use crate::config::SamplerThresholds;
use crate::geometry::{self, Point};

/// Outcome of a single [`SpeedSampler::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedSample {
    /// First sample after a reset; speed is reported as 0.
    Seeded,
    /// Too close in time to the last accepted sample; carries the rolling average.
    Throttled(f64),
    /// Sample accepted; carries the instantaneous speed.
    Accepted(f64),
    /// Implausible sample; state untouched.
    Rejected { speed: f64 },
}

impl SpeedSample {
    /// Speed to report to callers, `None` for rejected samples.
    pub fn speed(&self) -> Option<f64> {
        match *self {
            SpeedSample::Seeded => Some(0.0),
            SpeedSample::Throttled(avg) => Some(avg),
            SpeedSample::Accepted(speed) => Some(speed),
            SpeedSample::Rejected { .. } => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, SpeedSample::Rejected { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SpeedSampler {
    samples: VecDeque<f64>,
    last_position: Option<Point>,
    last_time: f64,
    capacity: usize,
    min_interval_s: f64,
    max_reasonable_speed: f64,
}

impl SpeedSampler {
    pub fn new(thresholds: &SamplerThresholds) -> Self {
        Self {
            samples: VecDeque::with_capacity(thresholds.speed_capacity),
            last_position: None,
            last_time: 0.0,
            capacity: thresholds.speed_capacity.max(1),
            min_interval_s: thresholds.min_interval_s,
            max_reasonable_speed: thresholds.max_reasonable_speed,
        }
    }

    /// Feed the position observed at time `now` (seconds).
    pub fn update(&mut self, position: Point, now: f64) -> SpeedSample {
        let Some(last_position) = self.last_position else {
            self.last_position = Some(position);
            self.last_time = now;
            return SpeedSample::Seeded;
        };

        let dt = now - self.last_time;
        if dt < self.min_interval_s {
            return SpeedSample::Throttled(self.average());
        }

        let speed = geometry::distance(last_position, position) / dt;
        if speed > self.max_reasonable_speed {
            debug!(
                speed,
                max = self.max_reasonable_speed,
                "rejected outlier speed sample"
            );
            return SpeedSample::Rejected { speed };
        }

        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(speed);
        self.last_position = Some(position);
        self.last_time = now;
        SpeedSample::Accepted(speed)
    }

    /// Mean of the accepted samples, 0 when empty.
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().sum::<f64>() / self.samples.len() as f64
        }
    }

    pub fn has_sufficient_data(&self, min_samples: usize) -> bool {
        self.samples.len() >= min_samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn last_accepted(&self) -> Option<(Point, f64)> {
        self.last_position.map(|p| (p, self.last_time))
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.last_position = None;
        self.last_time = 0.0;
    }
}

/// Fixed-lag position history for displacement sampling.
#[derive(Debug, Clone)]
pub struct DisplacementWindow {
    positions: VecDeque<Point>,
    lag: usize,
}

impl DisplacementWindow {
    pub fn new(lag_ticks: usize) -> Self {
        let lag = lag_ticks.max(1);
        Self {
            positions: VecDeque::with_capacity(lag + 1),
            lag,
        }
    }

    pub fn push(&mut self, position: Point) {
        if self.positions.len() > self.lag {
            self.positions.pop_front();
        }
        self.positions.push_back(position);
    }

    /// `(C, D, ticks)` once the window spans the full lag.
    pub fn pair(&self) -> Option<(Point, Point, usize)> {
        if self.positions.len() <= self.lag {
            return None;
        }
        let c = *self.positions.front()?;
        let d = *self.positions.back()?;
        Some((c, d, self.positions.len() - 1))
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}
