//! Charge tracker (§4.F): per-question reaction scoring and body-movement
//! rejection, fed by the broadcaster's raw signal stream.

use std::collections::VecDeque;

use serde::Serialize;

const BASELINE_WINDOW_S: f64 = 1.0;
const DEFAULT_REACTION_WINDOW_MS: u32 = 3000;
const BODY_MOVEMENT_THRESHOLD: f64 = 0.15;
const BODY_MOVEMENT_DECAY_MS: f64 = 200.0;
const MIN_SAMPLES_FOR_ANALYSIS: usize = 20;
const SIGNAL_BUFFER_CAP: usize = 1000;

/// Finalized (or in-progress) reaction record for one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCharge {
    pub question_text: String,
    pub question_time: f64,
    pub baseline_signal: f64,
    pub peak_deviation: f64,
    pub signal_delta: f64,
    pub charge_score: i32,
    pub body_movement: bool,
    pub reaction_window_ms: u32,
    pub needle_action_at_peak: String,
}

impl QuestionCharge {
    fn new(question_text: String, question_time: f64, baseline_signal: f64) -> Self {
        Self {
            question_text,
            question_time,
            baseline_signal,
            peak_deviation: 0.0,
            signal_delta: 0.0,
            charge_score: 0,
            body_movement: false,
            reaction_window_ms: DEFAULT_REACTION_WINDOW_MS,
            needle_action_at_peak: "idle".to_string(),
        }
    }
}

/// Per-question summary surfaced in the rolling question history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSummary {
    pub question: String,
    pub charge_score: i32,
    pub signal_delta: f64,
    pub body_movement: bool,
}

/// Snapshot returned by [`ChargeTracker::get_analysis`]: the latest
/// finalized question's scores plus the last 10 questions' summaries. Never
/// reflects a question still in its reaction window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeAnalysis {
    pub signal_delta: f64,
    pub peak_reaction: f64,
    pub charge_score: i32,
    pub body_movement: bool,
    pub last_question_charge: String,
    pub question_history: Vec<QuestionSummary>,
}

impl Default for ChargeAnalysis {
    fn default() -> Self {
        Self {
            signal_delta: 0.0,
            peak_reaction: 0.0,
            charge_score: 0,
            body_movement: false,
            last_question_charge: "N/A".to_string(),
            question_history: Vec::new(),
        }
    }
}

/// Tracks signal reaction around each question drop. `question_dropped`
/// captures a 1s pre-question baseline; over the following
/// `reaction_window_ms` the reaction is scored on peak deviation, signed
/// signal delta, sustained-deviation fraction, and a body-movement rejection
/// heuristic requiring both a fast onset and a fast decay.
pub struct ChargeTracker {
    signal_buffer: VecDeque<(f64, f64)>,
    questions: Vec<QuestionCharge>,
    current_question: Option<QuestionCharge>,
}

impl ChargeTracker {
    pub fn new() -> Self {
        Self { signal_buffer: VecDeque::with_capacity(256), questions: Vec::new(), current_question: None }
    }

    /// O(1) hot-path hook called for every signal sample on the broadcaster
    /// thread. Finalizes the active question once its reaction window elapses.
    pub fn feed_signal(&mut self, timestamp: f64, raw_value: f64) {
        if self.signal_buffer.len() >= SIGNAL_BUFFER_CAP {
            self.signal_buffer.pop_front();
        }
        self.signal_buffer.push_back((timestamp, raw_value));

        if let Some(q) = &self.current_question {
            let elapsed_ms = (timestamp - q.question_time) * 1000.0;
            if elapsed_ms >= q.reaction_window_ms as f64 {
                self.finalize_pending();
            }
        }
    }

    /// Marks a question as dropped at `now`, capturing the rolling buffer's
    /// trailing 1s as baseline and opening a reaction window. Finalizes any
    /// previously active question first.
    pub fn question_dropped(&mut self, question_text: String, now: f64) {
        self.finalize_pending();

        let baseline_samples: Vec<f64> =
            self.signal_buffer.iter().filter(|(ts, _)| now - ts <= BASELINE_WINDOW_S).map(|(_, v)| *v).collect();
        let baseline = mean(&baseline_samples);

        self.current_question = Some(QuestionCharge::new(question_text, now, baseline));
    }

    /// Closes out the active question (if any) without waiting for its
    /// reaction window to elapse naturally — used on session end.
    pub fn finalize_active(&mut self) {
        self.finalize_pending();
    }

    fn finalize_pending(&mut self) {
        let Some(mut q) = self.current_question.take() else {
            return;
        };

        let reaction_end = q.question_time + q.reaction_window_ms as f64 / 1000.0;
        let reaction_samples: Vec<(f64, f64)> =
            self.signal_buffer.iter().copied().filter(|(ts, _)| *ts >= q.question_time && *ts <= reaction_end).collect();

        if reaction_samples.len() < MIN_SAMPLES_FOR_ANALYSIS {
            q.charge_score = 0;
            self.questions.push(q);
            return;
        }

        let values: Vec<f64> = reaction_samples.iter().map(|(_, v)| *v).collect();
        let timestamps: Vec<f64> = reaction_samples.iter().map(|(t, _)| *t).collect();
        let deviations: Vec<f64> = values.iter().map(|v| (v - q.baseline_signal).abs()).collect();

        q.peak_deviation = deviations.iter().cloned().fold(0.0, f64::max);
        q.signal_delta = mean(&values) - q.baseline_signal;
        q.body_movement = is_body_movement(&deviations, &timestamps, q.peak_deviation);
        q.charge_score = compute_charge_score(&q, &deviations);

        self.questions.push(q);
    }

    /// The latest finalized question's scores plus the last 10 questions'
    /// summaries. Does not finalize an in-progress question.
    pub fn get_analysis(&self) -> ChargeAnalysis {
        let Some(latest) = self.questions.last() else {
            return ChargeAnalysis::default();
        };

        let question_history = self
            .questions
            .iter()
            .rev()
            .take(10)
            .rev()
            .map(|q| QuestionSummary {
                question: truncate(&q.question_text, 60),
                charge_score: q.charge_score,
                signal_delta: q.signal_delta,
                body_movement: q.body_movement,
            })
            .collect();

        ChargeAnalysis {
            signal_delta: latest.signal_delta,
            peak_reaction: latest.peak_deviation,
            charge_score: latest.charge_score,
            body_movement: latest.body_movement,
            last_question_charge: format!("{}/100", latest.charge_score),
            question_history,
        }
    }

    /// The full per-question charge history for session review.
    pub fn get_charge_map(&self) -> Vec<QuestionCharge> {
        self.questions.clone()
    }
}

impl Default for ChargeTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Body movement requires both a fast onset (reaching 80% of peak within
/// 50ms) and a fast decay (dropping below 30% of peak within
/// [`BODY_MOVEMENT_DECAY_MS`] of the peak) — a real reaction builds and
/// settles more gradually than a jolt or shift in the chair.
fn is_body_movement(deviations: &[f64], timestamps: &[f64], peak_dev: f64) -> bool {
    if deviations.len() < 10 || peak_dev < BODY_MOVEMENT_THRESHOLD {
        return false;
    }

    let peak_idx = deviations.iter().enumerate().max_by(|a, b| a.1.total_cmp(b.1)).map(|(i, _)| i).unwrap_or(0);

    let threshold_80 = peak_dev * 0.8;
    let mut onset_idx = 0;
    for (i, dev) in deviations.iter().enumerate().take(peak_idx) {
        if *dev >= threshold_80 {
            onset_idx = i;
            break;
        }
    }
    let onset_time_ms =
        if peak_idx > 0 && onset_idx < peak_idx { (timestamps[peak_idx] - timestamps[onset_idx]) * 1000.0 } else { 0.0 };
    let fast_onset = onset_time_ms < 50.0;

    let decay_threshold = peak_dev * 0.3;
    let mut decay_resolved = false;
    if peak_idx < deviations.len() - 1 {
        for i in peak_idx..deviations.len() {
            let elapsed_ms = (timestamps[i] - timestamps[peak_idx]) * 1000.0;
            if elapsed_ms > BODY_MOVEMENT_DECAY_MS {
                break;
            }
            if deviations[i] < decay_threshold {
                decay_resolved = true;
                break;
            }
        }
    }

    fast_onset && decay_resolved
}

/// 0-100 composite: signal-delta magnitude (40%), peak deviation (30%),
/// sustained-deviation fraction (20%), not-body-movement bonus (10%). Body
/// movement zeroes the score outright.
fn compute_charge_score(q: &QuestionCharge, deviations: &[f64]) -> i32 {
    if q.body_movement {
        return 0;
    }

    let delta_score = (q.signal_delta.abs() / 0.03).min(1.0);
    let peak_score = (q.peak_deviation / 0.05).min(1.0);

    let sustained_fraction = if q.peak_deviation > 0.0 {
        let threshold = q.peak_deviation * 0.2;
        let above = deviations.iter().filter(|d| **d > threshold).count();
        above as f64 / deviations.len() as f64
    } else {
        0.0
    };

    let raw_score = delta_score * 0.40 + peak_score * 0.30 + sustained_fraction * 0.20 + 0.10;
    (raw_score * 100.0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_flat(tracker: &mut ChargeTracker, start: f64, count: usize, value: f64, dt: f64) -> f64 {
        let mut t = start;
        for _ in 0..count {
            tracker.feed_signal(t, value);
            t += dt;
        }
        t
    }

    #[test]
    fn too_few_samples_yields_zeroed_score() {
        let mut tracker = ChargeTracker::new();
        let t = feed_flat(&mut tracker, 0.0, 5, 0.5, 0.1);
        tracker.question_dropped("locate an incident".to_string(), t);
        tracker.feed_signal(t + 0.1, 0.6);
        tracker.finalize_active();
        let map = tracker.get_charge_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map[0].charge_score, 0);
    }

    #[test]
    fn sustained_deviation_produces_nonzero_score() {
        let mut tracker = ChargeTracker::new();
        let mut t = feed_flat(&mut tracker, 0.0, 100, 0.5, 0.01);
        tracker.question_dropped("what happened?".to_string(), t);
        for i in 0..300 {
            let ramp = (i as f64 / 30.0).min(1.0);
            tracker.feed_signal(t, 0.5 + 0.08 * ramp);
            t += 0.01;
        }
        tracker.finalize_active();
        let map = tracker.get_charge_map();
        assert_eq!(map.len(), 1);
        assert!(!map[0].body_movement);
        assert!(map[0].charge_score > 0);
        assert!(map[0].charge_score <= 100);
    }

    #[test]
    fn fast_jolt_and_recovery_flags_body_movement() {
        let mut tracker = ChargeTracker::new();
        let mut t = feed_flat(&mut tracker, 0.0, 100, 0.5, 0.01);
        tracker.question_dropped("has it happened?".to_string(), t);
        tracker.feed_signal(t + 0.01, 0.8);
        t += 0.02;
        for _ in 0..40 {
            t += 0.003;
            tracker.feed_signal(t, 0.5);
        }
        tracker.finalize_active();
        let map = tracker.get_charge_map();
        assert_eq!(map.len(), 1);
        assert!(map[0].body_movement);
        assert_eq!(map[0].charge_score, 0);
    }

    #[test]
    fn get_analysis_reflects_only_finalized_history() {
        let mut tracker = ChargeTracker::new();
        let t = feed_flat(&mut tracker, 0.0, 100, 0.5, 0.01);
        tracker.question_dropped("recall the incident".to_string(), t);
        assert_eq!(tracker.get_analysis().charge_score, 0);
        assert!(tracker.get_analysis().question_history.is_empty());

        let mut t2 = t;
        for _ in 0..300 {
            tracker.feed_signal(t2, 0.6);
            t2 += 0.01;
        }
        tracker.finalize_active();
        let analysis = tracker.get_analysis();
        assert_eq!(analysis.question_history.len(), 1);
    }

    #[test]
    fn question_dropped_finalizes_a_pending_question_early() {
        let mut tracker = ChargeTracker::new();
        let t = feed_flat(&mut tracker, 0.0, 100, 0.5, 0.01);
        tracker.question_dropped("first".to_string(), t);
        tracker.feed_signal(t + 0.5, 0.5);
        tracker.question_dropped("second".to_string(), t + 1.0);
        let map = tracker.get_charge_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map[0].question_text, "first");
    }
}
