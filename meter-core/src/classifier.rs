//! Needle classifier (§4.D): FFT + time-domain priority cascade over a
//! rolling 2-second window.

use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

use crate::events::NeedleAction;

pub const WINDOW_SIZE: usize = 200;
pub const CLASSIFY_SAMPLE_RATE: f64 = 100.0;

const STUCK_VARIANCE_THRESHOLD: f64 = 0.0005;
const FALL_SLOPE_THRESHOLD: f64 = -0.001;
const RISE_SLOPE_THRESHOLD: f64 = 0.001;
const SPEEDED_FALL_SLOPE: f64 = -0.005;

/// Frequency-domain summary of a classification window.
struct Spectrum {
    /// Bin center frequencies, including DC at index 0.
    freqs: Vec<f64>,
    /// Power per bin (|FFT|^2), mean-centered input.
    power: Vec<f64>,
}

fn fft_power_spectrum(window: &[f64]) -> Spectrum {
    let n = window.len();
    let mean = window.iter().sum::<f64>() / n as f64;

    let mut buf: Vec<Complex64> = window.iter().map(|v| Complex64::new(v - mean, 0.0)).collect();
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buf);

    // Real input → Hermitian-symmetric spectrum; keep the first n/2+1 bins,
    // matching numpy's rfft/rfftfreq pair.
    let half = n / 2 + 1;
    let freqs: Vec<f64> = (0..half).map(|k| k as f64 * CLASSIFY_SAMPLE_RATE / n as f64).collect();
    let power: Vec<f64> = buf[..half].iter().map(|c| c.norm_sqr()).collect();

    Spectrum { freqs, power }
}

fn variance(window: &[f64]) -> f64 {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

fn amplitude(window: &[f64]) -> f64 {
    let max = window.iter().cloned().fold(f64::MIN, f64::max);
    let min = window.iter().cloned().fold(f64::MAX, f64::min);
    max - min
}

/// Least-squares slope (per-sample) of `window` against sample index.
fn slope(window: &[f64]) -> f64 {
    let n = window.len() as f64;
    let xs: Vec<f64> = (0..window.len()).map(|i| i as f64).collect();
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = window.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (x, y) in xs.iter().zip(window.iter()) {
        num += (x - x_mean) * (y - y_mean);
        den += (x - x_mean).powi(2);
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn zero_crossings(window: &[f64]) -> usize {
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    let signs: Vec<f64> = window.iter().map(|v| (v - mean).signum()).collect();
    signs.windows(2).filter(|pair| (pair[1] - pair[0]).abs() > 0.0).count()
}

/// Longest run of consecutive negative first differences, in seconds.
fn fall_duration_secs(window: &[f64]) -> f64 {
    let mut max_run = 0usize;
    let mut current = 0usize;
    for pair in window.windows(2) {
        if pair[1] - pair[0] < 0.0 {
            current += 1;
            max_run = max_run.max(current);
        } else {
            current = 0;
        }
    }
    max_run as f64 / CLASSIFY_SAMPLE_RATE
}

fn band_power_ratio(spec: &Spectrum, f_low: f64, f_high: f64) -> f64 {
    let total: f64 = spec.power[1..].iter().sum();
    if total < 1e-10 {
        return 0.0;
    }
    let band: f64 = spec
        .freqs
        .iter()
        .zip(spec.power.iter())
        .filter(|(f, _)| **f >= f_low && **f <= f_high)
        .map(|(_, p)| p)
        .sum();
    band / total
}

/// Peak-over-mean ratio within a frequency band — higher means more periodic.
fn periodicity(spec: &Spectrum, f_low: f64, f_high: f64) -> f64 {
    let band: Vec<f64> = spec
        .freqs
        .iter()
        .zip(spec.power.iter())
        .filter(|(f, _)| **f >= f_low && **f <= f_high)
        .map(|(_, p)| *p)
        .collect();
    if band.is_empty() {
        return 0.0;
    }
    let mean = band.iter().sum::<f64>() / band.len() as f64;
    if mean < 1e-10 {
        return 0.0;
    }
    band.iter().cloned().fold(f64::MIN, f64::max) / mean
}

fn is_rock_slam(amp: f64, crossings: usize) -> bool {
    amp > 0.3 && crossings >= 6
}

fn is_floating_needle(spec: &Spectrum, crossings: usize, amp: f64) -> bool {
    if amp < 0.05 {
        return false;
    }
    let total: f64 = spec.power[1..].iter().sum();
    if total < 1e-10 {
        return false;
    }
    let in_band: Vec<(f64, f64)> = spec
        .freqs
        .iter()
        .zip(spec.power.iter())
        .filter(|(f, _)| **f >= 0.15 && **f <= 0.6)
        .map(|(f, p)| (*f, *p))
        .collect();
    if in_band.is_empty() {
        return false;
    }
    let band_power: f64 = in_band.iter().map(|(_, p)| p).sum();
    if band_power / total < 0.25 {
        return false;
    }
    if crossings < 2 {
        return false;
    }
    let peak_in_band = in_band.iter().map(|(_, p)| *p).fold(f64::MIN, f64::max);
    let outside: Vec<f64> = spec
        .freqs
        .iter()
        .zip(spec.power.iter())
        .skip(1)
        .filter(|(f, _)| !(**f >= 0.15 && **f <= 0.6))
        .map(|(_, p)| *p)
        .collect();
    if !outside.is_empty() {
        let mean_outside = outside.iter().sum::<f64>() / outside.len() as f64;
        if mean_outside > 0.0 && peak_in_band / mean_outside < 3.0 {
            return false;
        }
    }
    true
}

fn is_dirty(var: f64, spec: &Spectrum) -> bool {
    if var <= 0.01 {
        return false;
    }
    let tail = &spec.power[1..];
    let total: f64 = tail.iter().sum();
    if total < 1e-10 {
        return false;
    }
    let peak = tail.iter().cloned().fold(f64::MIN, f64::max);
    let periodicity = peak / (total / tail.len() as f64);
    periodicity < 2.0
}

/// Classifies a rolling window of smoothed needle-position samples into one
/// of the 21 canonical actions, with a confidence in [0,1].
pub struct NeedleClassifier;

impl NeedleClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, window: &[f64]) -> (NeedleAction, f64) {
        if window.len() < WINDOW_SIZE {
            return (NeedleAction::Idle, 0.0);
        }

        let var = variance(window);
        let amp = amplitude(window);
        let spec = fft_power_spectrum(window);
        let slope = slope(window);
        let crossings = zero_crossings(window);

        if is_rock_slam(amp, crossings) {
            return (NeedleAction::RockSlam, (amp / 0.5).min(1.0));
        }

        if var < STUCK_VARIANCE_THRESHOLD {
            return (NeedleAction::Stuck, 1.0 - var / STUCK_VARIANCE_THRESHOLD);
        }

        if slope < FALL_SLOPE_THRESHOLD {
            let action = classify_fall(window, slope);
            return (action, (slope.abs() / 0.01).min(1.0));
        }

        if slope > RISE_SLOPE_THRESHOLD {
            return (NeedleAction::Rise, (slope / 0.01).min(1.0));
        }

        if is_floating_needle(&spec, crossings, amp) {
            return (NeedleAction::Floating, 0.85);
        }

        if amp > 0.03 {
            let p = periodicity(&spec, 4.5, 11.0);
            let ratio = band_power_ratio(&spec, 4.5, 11.0);
            if p > 3.0 && ratio > 0.2 {
                return (NeedleAction::ThetaBlink, (p / 5.0).min(1.0));
            }
        }

        if amp > 0.05 {
            let p = periodicity(&spec, 0.8, 1.5);
            let ratio = band_power_ratio(&spec, 0.8, 1.5);
            if p > 3.0 && ratio > 0.2 {
                return (NeedleAction::StageFour, (p / 5.0).min(1.0));
            }
        }

        if is_dirty(var, &spec) {
            return (NeedleAction::DirtyNeedle, 0.6);
        }

        (NeedleAction::FreeNeedle, 0.5)
    }
}

impl Default for NeedleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_fall(window: &[f64], slope: f64) -> NeedleAction {
    let duration = fall_duration_secs(window);
    if duration > 2.0 {
        NeedleAction::LongFallBlowdown
    } else if duration > 0.5 {
        NeedleAction::LongFall
    } else if slope < SPEEDED_FALL_SLOPE {
        NeedleAction::SpeededFall
    } else {
        NeedleAction::Fall
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn below_window_size_is_idle() {
        let classifier = NeedleClassifier::new();
        let window = vec![0.5; WINDOW_SIZE - 1];
        let (action, confidence) = classifier.classify(&window);
        assert_eq!(action, NeedleAction::Idle);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn floating_needle_sine_wave() {
        let classifier = NeedleClassifier::new();
        let window: Vec<f64> = (0..WINDOW_SIZE)
            .map(|i| {
                let t = i as f64 / CLASSIFY_SAMPLE_RATE;
                0.5 + 0.1 * (2.0 * PI * 0.3 * t).sin()
            })
            .collect();
        let (action, confidence) = classifier.classify(&window);
        assert_eq!(action, NeedleAction::Floating);
        assert!((confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn long_fall_ramp() {
        let classifier = NeedleClassifier::new();
        let window: Vec<f64> = (0..WINDOW_SIZE)
            .map(|i| 0.9 - (0.8 * i as f64 / (WINDOW_SIZE as f64 - 1.0)))
            .collect();
        let (action, _) = classifier.classify(&window);
        assert_eq!(action, NeedleAction::LongFall);
    }

    #[test]
    fn stuck_constant_signal() {
        let classifier = NeedleClassifier::new();
        let window = vec![0.5_f64; WINDOW_SIZE];
        let (action, confidence) = classifier.classify(&window);
        assert_eq!(action, NeedleAction::Stuck);
        assert!(confidence > 0.99);
    }

    #[test]
    fn rock_slam_large_oscillation() {
        let classifier = NeedleClassifier::new();
        let window: Vec<f64> = (0..WINDOW_SIZE)
            .map(|i| {
                let t = i as f64 / CLASSIFY_SAMPLE_RATE;
                0.5 + 0.3 * (2.0 * PI * 3.5 * t).sin()
            })
            .collect();
        let (action, _) = classifier.classify(&window);
        assert_eq!(action, NeedleAction::RockSlam);
    }

    #[test]
    fn confidence_always_in_unit_range() {
        let classifier = NeedleClassifier::new();
        let window: Vec<f64> = (0..WINDOW_SIZE)
            .map(|i| 0.5 + 0.02 * ((i as f64) * 0.37).sin())
            .collect();
        let (_, confidence) = classifier.classify(&window);
        assert!((0.0..=1.0).contains(&confidence));
    }
}
