//! Signal pipeline (§4.C): biquad low-pass → spring-mass-damper → baseline
//! EMA → auto-SET → scaled needle position.

use std::f64::consts::PI;

/// Device sample rate in Hz (§4.A).
pub const SAMPLE_RATE_HZ: f64 = 62.0;
pub const DT: f64 = 1.0 / SAMPLE_RATE_HZ;

const BASELINE_ALPHA: f64 = 1.0 / (30.0 * SAMPLE_RATE_HZ);
const BASELINE_MIN_SAMPLES: u32 = 120;
const NEEDLE_SCALE: f64 = 2000.0;

/// Second-order IIR low-pass, Direct Form II Transposed (Butterworth).
///
/// State is seeded to steady-state on the first sample so the filter's
/// output equals its input immediately, rather than ramping up from zero.
#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
    initialized: bool,
}

impl Biquad {
    pub fn new(cutoff_hz: f64, sample_rate_hz: f64, q: f64) -> Self {
        let w0 = 2.0 * PI * cutoff_hz / sample_rate_hz;
        let alpha = w0.sin() / (2.0 * q);
        let cosw = w0.cos();
        let a0 = 1.0 + alpha;
        Self {
            b0: ((1.0 - cosw) / 2.0) / a0,
            b1: (1.0 - cosw) / a0,
            b2: ((1.0 - cosw) / 2.0) / a0,
            a1: (-2.0 * cosw) / a0,
            a2: (1.0 - alpha) / a0,
            z1: 0.0,
            z2: 0.0,
            initialized: false,
        }
    }

    pub fn process(&mut self, input: f64) -> f64 {
        if !self.initialized {
            self.reset(input);
            return input;
        }
        let out = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * out + self.z2;
        self.z2 = self.b2 * input - self.a2 * out;
        out
    }

    fn reset(&mut self, value: f64) {
        self.z1 = value * (1.0 - self.b0);
        self.z2 = value * (self.b2 - self.a2);
        self.initialized = true;
    }
}

/// Spring-mass-damper smoother, symplectic Euler integration, operating in
/// raw ADC units (no clamping — that happens after SET subtraction).
#[derive(Debug, Clone)]
pub struct SpringMassDamper {
    mass: f64,
    damping: f64,
    spring: f64,
    dt: f64,
    velocity: f64,
    position: f64,
    initialized: bool,
}

impl SpringMassDamper {
    pub fn new(mass: f64, damping: f64, spring: f64, dt: f64) -> Self {
        Self {
            mass,
            damping,
            spring,
            dt,
            velocity: 0.0,
            position: 0.0,
            initialized: false,
        }
    }

    pub fn step(&mut self, input: f64) -> f64 {
        if !self.initialized {
            self.position = input;
            self.velocity = 0.0;
            self.initialized = true;
            return input;
        }
        let accel = (self.spring * (input - self.position) - self.damping * self.velocity) / self.mass;
        self.velocity += self.dt * accel;
        self.position += self.dt * self.velocity;
        self.position
    }

    pub fn position(&self) -> f64 {
        self.position
    }
}

/// Owns the per-session filter chain and produces a needle position in
/// [0,1] from each raw ADC sample.
pub struct SignalPipeline {
    biquad: Biquad,
    smd: SpringMassDamper,
    baseline: Option<f64>,
    baseline_samples: u32,
    set_point: Option<f64>,
}

/// Output of one pipeline step.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOutput {
    /// Needle position in [0,1].
    pub position: f64,
    /// The spring-mass-damper's smoothed output (still in raw ADC units).
    pub smoothed_raw: f64,
}

impl SignalPipeline {
    pub fn new() -> Self {
        Self {
            biquad: Biquad::new(3.0, SAMPLE_RATE_HZ, 0.707),
            smd: SpringMassDamper::new(1.0, 14.1, 50.0, DT),
            baseline: None,
            baseline_samples: 0,
            set_point: None,
        }
    }

    pub fn process(&mut self, raw_adc: f64) -> PipelineOutput {
        let filtered = self.biquad.process(raw_adc);
        let smooth = self.smd.step(filtered);

        self.baseline = Some(match self.baseline {
            None => smooth,
            Some(b) => BASELINE_ALPHA * smooth + (1.0 - BASELINE_ALPHA) * b,
        });
        self.baseline_samples += 1;

        if self.set_point.is_none() && self.baseline_samples >= BASELINE_MIN_SAMPLES {
            self.set_point = Some(smooth);
        }

        let set_ref = self.set_point.unwrap_or_else(|| self.baseline.unwrap());
        let signal_diff = set_ref - smooth;
        let raw_needle = (signal_diff / NEEDLE_SCALE).clamp(-1.0, 1.0);
        let position = 0.5 - raw_needle * 0.5;

        PipelineOutput { position, smoothed_raw: smooth }
    }

    pub fn set_point(&self) -> Option<f64> {
        self.set_point
    }

    /// Capture the current smoother output as the SET reference, overriding
    /// auto-SET. Mirrors the manual "SET" control on the physical meter.
    pub fn set_reference(&mut self) {
        self.set_point = Some(self.smd.position());
    }
}

impl Default for SignalPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn biquad_first_sample_equals_input() {
        let mut bq = Biquad::new(3.0, SAMPLE_RATE_HZ, 0.707);
        assert_relative_eq!(bq.process(123.0), 123.0);
    }

    #[test]
    fn biquad_steady_input_stays_steady() {
        let mut bq = Biquad::new(3.0, SAMPLE_RATE_HZ, 0.707);
        bq.process(100.0);
        for _ in 0..200 {
            bq.process(100.0);
        }
        assert_relative_eq!(bq.process(100.0), 100.0, epsilon = 1e-6);
    }

    #[test]
    fn smd_first_sample_equals_input() {
        let mut smd = SpringMassDamper::new(1.0, 14.1, 50.0, DT);
        assert_relative_eq!(smd.step(55.0), 55.0);
    }

    #[test]
    fn pipeline_first_sample_is_identity_position() {
        // Before SET and baseline, diff is 0 on the very first sample
        // (set_ref == baseline == smooth), so position starts at 0.5.
        let mut pipeline = SignalPipeline::new();
        let out = pipeline.process(3_200_000.0);
        assert_relative_eq!(out.position, 0.5, epsilon = 1e-9);
        assert_relative_eq!(out.smoothed_raw, 3_200_000.0);
    }

    #[test]
    fn auto_set_captures_after_min_samples() {
        let mut pipeline = SignalPipeline::new();
        for _ in 0..BASELINE_MIN_SAMPLES {
            pipeline.process(3_200_000.0);
        }
        assert!(pipeline.set_point().is_some());
    }

    #[test]
    fn needle_position_stays_in_unit_range_on_large_swing() {
        let mut pipeline = SignalPipeline::new();
        for _ in 0..200 {
            pipeline.process(3_200_000.0);
        }
        let out = pipeline.process(0.0);
        assert!((0.0..=1.0).contains(&out.position));
    }
}
