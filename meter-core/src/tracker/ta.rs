//! Tone-arm tracker (§4.E): accumulates up/down motion and reports trend.

use std::collections::VecDeque;

use crate::events::{TaMotion, TaTrend};

const MAX_HISTORY: usize = 30_000;
const TA_NOISE_THRESHOLD: f64 = 0.001;
const TREND_WINDOW_SECS: f64 = 60.0;
const TREND_RISING_THRESHOLD: f64 = 0.005;
const TREND_FALLING_THRESHOLD: f64 = -0.005;

/// A single tone-arm reading, `(timestamp_secs, value)`.
type TaReading = (f64, f64);

/// Tracks the physical tone-arm dial across a session: cumulative up/down
/// motion, current trend, and the `[1.5, 4.0]` gate a session requires
/// before PROCESSING can begin.
pub struct TaTracker {
    history: VecDeque<TaReading>,
    total_down_motion: f64,
    total_up_motion: f64,
    start_ta: Option<f64>,
    last_value: Option<f64>,
}

impl TaTracker {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(MAX_HISTORY.min(1024)),
            total_down_motion: 0.0,
            total_up_motion: 0.0,
            start_ta: None,
            last_value: None,
        }
    }

    /// Feed a new tone-arm reading at `timestamp` seconds.
    pub fn update(&mut self, timestamp: f64, value: f64) {
        if self.start_ta.is_none() {
            self.start_ta = Some(value);
        }
        if let Some(last) = self.last_value {
            let delta = value - last;
            if delta.abs() > TA_NOISE_THRESHOLD {
                if delta > 0.0 {
                    self.total_up_motion += delta;
                } else {
                    self.total_down_motion += -delta;
                }
            }
        }
        self.last_value = Some(value);

        if self.history.len() >= MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back((timestamp, value));
    }

    pub fn reset_session(&mut self) {
        self.history.clear();
        self.total_down_motion = 0.0;
        self.total_up_motion = 0.0;
        self.start_ta = None;
        self.last_value = None;
    }

    pub fn session_ta_motion(&self) -> TaMotion {
        TaMotion {
            total_down_motion: self.total_down_motion,
            total_up_motion: self.total_up_motion,
            net_motion: self.total_up_motion - self.total_down_motion,
            start_ta: self.start_ta.unwrap_or(0.0),
            current_ta: self.last_value.unwrap_or(0.0),
        }
    }

    /// Gate for entering PROCESSING: tone arm must be in a sane physical range.
    pub fn can_start_session(&self) -> bool {
        matches!(self.last_value, Some(v) if (1.5..=4.0).contains(&v))
    }

    pub fn is_moving(&self) -> bool {
        if self.history.len() < 2 {
            return false;
        }
        let (_, last) = *self.history.back().unwrap();
        let (_, prev) = self.history[self.history.len() - 2];
        (last - prev).abs() > TA_NOISE_THRESHOLD
    }

    /// Linear-fit trend over the last [`TREND_WINDOW_SECS`] of history.
    /// Needs at least 10 readings spanning at least a second before it will
    /// report anything but STABLE — too few points make the slope noise.
    pub fn trend(&self) -> TaTrend {
        let recent = self.recent(TREND_WINDOW_SECS);
        if recent.len() < 10 {
            return TaTrend::Stable;
        }
        let span = recent.last().unwrap().0 - recent.first().unwrap().0;
        if span < 1.0 {
            return TaTrend::Stable;
        }
        let slope = linear_slope(&recent);
        if slope > TREND_RISING_THRESHOLD {
            TaTrend::Rising
        } else if slope < TREND_FALLING_THRESHOLD {
            TaTrend::Falling
        } else {
            TaTrend::Stable
        }
    }

    fn recent(&self, window_secs: f64) -> Vec<TaReading> {
        let Some((latest_t, _)) = self.history.back().copied() else {
            return Vec::new();
        };
        let cutoff = latest_t - window_secs;
        self.history.iter().copied().filter(|(t, _)| *t >= cutoff).collect()
    }
}

impl Default for TaTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn linear_slope(points: &[TaReading]) -> f64 {
    let n = points.len() as f64;
    let x_mean = points.iter().map(|(t, _)| t).sum::<f64>() / n;
    let y_mean = points.iter().map(|(_, v)| v).sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (t, v) in points {
        num += (t - x_mean) * (v - y_mean);
        den += (t - x_mean).powi(2);
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
