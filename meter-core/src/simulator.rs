//! Synthetic sample source (§4.B): drives the pipeline when no hardware is
//! present, so the rest of the engine can be exercised without a device.

use std::thread;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::buffering::SampleQueue;

pub const SIMULATOR_SAMPLE_RATE_HZ: f64 = 100.0;
const DT: f64 = 1.0 / SIMULATOR_SAMPLE_RATE_HZ;

/// Waveform patterns the simulator can emit, selected by name so a session
/// can script a scenario (e.g. a test harness forcing `"floating"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimAction {
    Idle,
    Fall,
    LongFall,
    Rise,
    Floating,
    RockSlam,
    ThetaBlink,
    StageFour,
    DirtyNeedle,
    FreeNeedle,
    Stuck,
}

impl SimAction {
    pub fn from_label(label: &str) -> Self {
        match label {
            "fall" => SimAction::Fall,
            "long_fall" | "long_fall_blowdown" | "speeded_fall" => SimAction::LongFall,
            "rise" => SimAction::Rise,
            "floating" => SimAction::Floating,
            "rock_slam" => SimAction::RockSlam,
            "theta_blink" => SimAction::ThetaBlink,
            "stage_four" => SimAction::StageFour,
            "dirty_needle" => SimAction::DirtyNeedle,
            "free_needle" => SimAction::FreeNeedle,
            "stuck" => SimAction::Stuck,
            _ => SimAction::Idle,
        }
    }
}

/// Generates synthetic raw signal samples matching the rough waveform shape
/// of each needle action, for use when no HID device is attached.
pub struct MeterSimulator {
    rng: SmallRng,
    noise: Normal<f64>,
    action: SimAction,
    t: f64,
    ramp_origin: f64,
    tone_arm: f64,
}

impl MeterSimulator {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
            noise: Normal::new(0.0, 0.01).expect("fixed normal params are valid"),
            action: SimAction::Idle,
            t: 0.0,
            ramp_origin: 0.5,
            tone_arm: 2.0,
        }
    }

    pub fn set_action(&mut self, action: SimAction) {
        self.action = action;
        self.t = 0.0;
        self.ramp_origin = 0.5;
    }

    pub fn tone_arm(&self) -> f64 {
        self.tone_arm
    }

    /// Produce the next raw sample (in the same [0,1]-ish position space the
    /// device pipeline would output, not raw ADC counts).
    pub fn next_sample(&mut self) -> f64 {
        let eps = self.noise.sample(&mut self.rng);
        let value = match self.action {
            SimAction::Idle => 0.5 + eps,
            SimAction::Fall => {
                let v = self.ramp_origin - 0.15 * self.t;
                v.clamp(0.0, 1.0) + eps * 0.3
            }
            SimAction::LongFall => {
                let v = self.ramp_origin - 0.22 * self.t;
                v.clamp(0.0, 1.0) + eps * 0.3
            }
            SimAction::Rise => {
                let v = self.ramp_origin + 0.12 * self.t;
                v.clamp(0.0, 1.0) + eps * 0.3
            }
            SimAction::Floating => 0.5 + 0.1 * (2.0 * std::f64::consts::PI * 0.3 * self.t).sin() + eps * 0.3,
            SimAction::RockSlam => {
                let freq = 3.0 + self.rng.gen::<f64>();
                0.5 + 0.3 * (2.0 * std::f64::consts::PI * freq * self.t).sin() + eps
            }
            SimAction::ThetaBlink => 0.5 + 0.08 * (2.0 * std::f64::consts::PI * 7.0 * self.t).sin() + eps * 0.2,
            SimAction::StageFour => 0.5 + 0.1 * (2.0 * std::f64::consts::PI * 1.0 * self.t).sin() + eps * 0.2,
            SimAction::DirtyNeedle => {
                self.ramp_origin += self.rng.gen_range(-0.01..0.01);
                self.ramp_origin.clamp(0.0, 1.0)
            }
            SimAction::FreeNeedle => {
                self.ramp_origin += self.rng.gen_range(-0.001..0.001);
                self.ramp_origin.clamp(0.0, 1.0) + eps * 0.3
            }
            SimAction::Stuck => 0.5 + eps * 0.01,
        };
        self.t += DT;
        self.update_tone_arm();
        value.clamp(0.0, 1.0)
    }

    fn update_tone_arm(&mut self) {
        match self.action {
            SimAction::Fall | SimAction::LongFall => {
                self.tone_arm = (self.tone_arm - 0.002).max(1.0);
            }
            SimAction::Rise => {
                self.tone_arm = (self.tone_arm + 0.002).min(5.0);
            }
            SimAction::Floating => {
                let diff = 2.0 - self.tone_arm;
                self.tone_arm += diff * 0.001;
            }
            SimAction::RockSlam => {
                self.tone_arm += self.rng.gen_range(-0.001..0.001);
            }
            _ => {}
        }
    }

    /// Runs the generator loop at `SIMULATOR_SAMPLE_RATE_HZ`, pushing raw
    /// samples into `queue` until `running` flips false. Intended to run on
    /// a dedicated OS thread via `spawn_blocking`, mirroring the device reader.
    pub fn run_loop(mut self, queue: SampleQueue, running: std::sync::Arc<std::sync::atomic::AtomicBool>) {
        use std::sync::atomic::Ordering;
        let mut timestamp = 0.0f64;
        while running.load(Ordering::Relaxed) {
            let value = self.next_sample();
            queue.push((timestamp, value, self.tone_arm, value, value));
            timestamp += DT;
            thread::sleep(Duration::from_secs_f64(DT));
        }
    }
}

impl Default for MeterSimulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_stays_near_center() {
        let mut sim = MeterSimulator::new();
        sim.set_action(SimAction::Idle);
        for _ in 0..100 {
            let v = sim.next_sample();
            assert!((0.3..=0.7).contains(&v));
        }
    }

    #[test]
    fn fall_trends_downward() {
        let mut sim = MeterSimulator::new();
        sim.set_action(SimAction::Fall);
        let first = sim.next_sample();
        for _ in 0..50 {
            sim.next_sample();
        }
        let later = sim.next_sample();
        assert!(later < first);
    }

    #[test]
    fn from_label_round_trips_known_names() {
        assert_eq!(SimAction::from_label("floating"), SimAction::Floating);
        assert_eq!(SimAction::from_label("unknown"), SimAction::Idle);
    }
}
