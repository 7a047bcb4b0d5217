//! Broadcaster (§4.G): the engine's central loop — drains raw samples,
//! classifies on a 2s cadence, and publishes [`MeterEvent`]s at 10 Hz.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::debug;

use crate::buffering::SampleQueue;
use crate::classifier::{NeedleClassifier, WINDOW_SIZE};
use crate::device::{self, RunFlag};
use crate::events::{MeterEvent, NeedleAction};
use crate::simulator::MeterSimulator;
use crate::tracker::TaTracker;

const CLASSIFY_INTERVAL: Duration = Duration::from_secs(2);
const BROADCAST_RATE_HZ: u64 = 10;
const DRAIN_BATCH: usize = 20;
const ROLLING_WINDOW_TRIM_SECS: f64 = 5.0;

/// Shared, lock-guarded state the async tick loop reads and the device/
/// simulator threads write into via the sample queue.
struct SharedState {
    session_id: RwLock<Option<String>>,
    hardware_connected: RwLock<bool>,
    rolling_window: RwLock<VecDeque<f64>>,
    last_classification: RwLock<(NeedleAction, f64, f64)>,
    raw_signal: RwLock<f64>,
    raw_unfiltered: RwLock<f64>,
    tone_arm: RwLock<f64>,
    samples_received: AtomicU64,
}

/// Orchestrates the device (or simulator) sample source, classifier, and
/// tone-arm tracker, and fans out [`MeterEvent`]s to any number of
/// subscribers via a broadcast channel.
pub struct Broadcaster {
    queue: SampleQueue,
    run_flag: RunFlag,
    state: Arc<SharedState>,
    classifier: NeedleClassifier,
    ta_tracker: Arc<parking_lot::Mutex<TaTracker>>,
    events_tx: broadcast::Sender<MeterEvent>,
}

impl Broadcaster {
    /// Builds the broadcaster and starts its sample source: a real HID
    /// device if present, otherwise the simulator. The device/simulator run
    /// on a dedicated OS thread; this struct's own loop must be driven by
    /// calling [`Broadcaster::run`] on a tokio task.
    pub fn new() -> Self {
        let queue = SampleQueue::default();
        let run_flag = RunFlag::new();

        let hardware_connected = device::start_best_source(queue.clone(), run_flag.clone());
        if !hardware_connected {
            let sim = MeterSimulator::new();
            let sim_queue = queue.clone();
            let sim_flag = run_flag.as_arc();
            std::thread::spawn(move || sim.run_loop(sim_queue, sim_flag));
        }

        let (events_tx, _) = broadcast::channel(256);

        Self {
            queue,
            run_flag,
            state: Arc::new(SharedState {
                session_id: RwLock::new(None),
                hardware_connected: RwLock::new(hardware_connected),
                rolling_window: RwLock::new(VecDeque::with_capacity(WINDOW_SIZE * 2)),
                last_classification: RwLock::new((NeedleAction::Idle, 0.5, 0.0)),
                raw_signal: RwLock::new(0.0),
                raw_unfiltered: RwLock::new(0.0),
                tone_arm: RwLock::new(2.0),
                samples_received: AtomicU64::new(0),
            }),
            classifier: NeedleClassifier::new(),
            ta_tracker: Arc::new(parking_lot::Mutex::new(TaTracker::new())),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MeterEvent> {
        self.events_tx.subscribe()
    }

    pub fn set_session_id(&self, session_id: Option<String>) {
        *self.state.session_id.write() = session_id;
    }

    pub fn hardware_connected(&self) -> bool {
        *self.state.hardware_connected.read()
    }

    pub fn ta_tracker(&self) -> Arc<parking_lot::Mutex<TaTracker>> {
        self.ta_tracker.clone()
    }

    /// Snapshot of the rolling position-history window (§4.G), most recent
    /// `max` readings, oldest first.
    pub fn recent_readings(&self, max: usize) -> Vec<f64> {
        let window = self.state.rolling_window.read();
        window.iter().rev().take(max).rev().copied().collect()
    }

    pub fn stop(&self) {
        self.run_flag.stop();
    }

    /// Runs the drain/classify/broadcast loop until `stop()` is called.
    /// Intended to be spawned once as a long-lived tokio task.
    pub async fn run(&self) {
        let mut last_classify = tokio::time::Instant::now();
        let mut ticker = interval(Duration::from_millis(1000 / BROADCAST_RATE_HZ));

        while self.run_flag.is_running() {
            ticker.tick().await;

            let drained = self.queue.drain(DRAIN_BATCH);
            if drained.is_empty() {
                continue;
            }

            let mut window = self.state.rolling_window.write();
            for (_, position, tone_arm, smoothed_raw, raw_adc) in &drained {
                window.push_back(*position);
                *self.state.raw_signal.write() = *smoothed_raw;
                *self.state.raw_unfiltered.write() = *raw_adc;
                *self.state.tone_arm.write() = *tone_arm;
                self.state.samples_received.fetch_add(1, Ordering::Relaxed);
            }
            let max_len = (ROLLING_WINDOW_TRIM_SECS * crate::device::POLL_RATE_HZ) as usize;
            while window.len() > max_len {
                window.pop_front();
            }
            drop(window);

            if last_classify.elapsed() >= CLASSIFY_INTERVAL {
                self.classify_and_record();
                last_classify = tokio::time::Instant::now();
            }

            self.publish();
        }
    }

    fn classify_and_record(&self) {
        let window = self.state.rolling_window.read();
        if window.len() < WINDOW_SIZE {
            return;
        }
        let slice: Vec<f64> = window.iter().rev().take(WINDOW_SIZE).rev().copied().collect();
        drop(window);

        let (action, confidence) = self.classifier.classify(&slice);
        let position = slice.last().copied().unwrap_or(0.5);
        *self.state.last_classification.write() = (action, position, confidence);
        debug!(?action, confidence, "classified window");
    }

    fn publish(&self) {
        let (action, position, confidence) = *self.state.last_classification.read();
        let ta_motion = self.ta_tracker.lock().session_ta_motion();
        let trend = self.ta_tracker.lock().trend();

        let event = MeterEvent {
            timestamp: now_secs(),
            needle_action: action,
            position,
            tone_arm: *self.state.tone_arm.read(),
            session_id: self.state.session_id.read().clone(),
            ta_trend: trend,
            confidence,
            hardware_connected: *self.state.hardware_connected.read(),
            samples_received: self.state.samples_received.load(Ordering::Relaxed),
            raw_signal: *self.state.raw_signal.read(),
            raw_unfiltered: *self.state.raw_unfiltered.read(),
            classified_at: now_secs(),
            ta_motion,
            ..MeterEvent::default()
        };

        // A full channel just means no subscribers are draining fast enough;
        // dropping the newest event here (vs. blocking the loop) is the
        // right tradeoff for a live telemetry stream.
        let _ = self.events_tx.send(event);
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

fn now_secs() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcaster_starts_with_no_session() {
        let broadcaster = Broadcaster::new();
        assert!(broadcaster.subscribe().try_recv().is_err());
        broadcaster.stop();
    }

    #[test]
    fn set_session_id_round_trips() {
        let broadcaster = Broadcaster::new();
        broadcaster.set_session_id(Some("sess-1".into()));
        assert_eq!(*broadcaster.state.session_id.read(), Some("sess-1".to_string()));
        broadcaster.stop();
    }

    #[test]
    fn recent_readings_reflects_rolling_window() {
        let broadcaster = Broadcaster::new();
        {
            let mut window = broadcaster.state.rolling_window.write();
            for v in [0.1, 0.2, 0.3, 0.4, 0.5] {
                window.push_back(v);
            }
        }
        assert_eq!(broadcaster.recent_readings(3), vec![0.3, 0.4, 0.5]);
        assert_eq!(broadcaster.recent_readings(100), vec![0.1, 0.2, 0.3, 0.4, 0.5]);
        broadcaster.stop();
    }
}
