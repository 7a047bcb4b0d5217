//! Hardware device reader (§4.A): owns the USB HID connection and feeds raw
//! ADC samples into a [`SignalPipeline`](crate::pipeline::SignalPipeline).

#[cfg(feature = "hid")]
mod hid;

#[cfg(feature = "hid")]
pub use hid::HidMeterReader;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default Theta-Meter USB identity, overridable via `THETA_METER_VID` /
/// `THETA_METER_PID` (hex, e.g. `0x1fc9`).
pub const DEFAULT_VID: u16 = 0x1FC9;
pub const DEFAULT_PID: u16 = 0x0003;

pub const POLL_RATE_HZ: f64 = 62.0;
pub const RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_millis(750);

/// Shared stop flag handed to a reader's background thread.
#[derive(Clone, Default)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    /// Exposes the underlying flag for callers (the simulator's `run_loop`)
    /// that predate this wrapper and take a bare `Arc<AtomicBool>`.
    pub fn as_arc(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

/// Resolve VID/PID from environment, falling back to the hard-coded defaults.
/// Mirrors the Python reader's `THETA_METER_VID`/`THETA_METER_PID` lookup.
pub fn resolve_ids() -> (u16, u16) {
    let vid = std::env::var("THETA_METER_VID")
        .ok()
        .and_then(|s| parse_hex_u16(&s))
        .unwrap_or(DEFAULT_VID);
    let pid = std::env::var("THETA_METER_PID")
        .ok()
        .and_then(|s| parse_hex_u16(&s))
        .unwrap_or(DEFAULT_PID);
    (vid, pid)
}

fn parse_hex_u16(s: &str) -> Option<u16> {
    let trimmed = s.trim().trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(trimmed, 16).ok()
}

/// Tries to start a hardware reader on `queue`/`run`; returns `true` if the
/// device was found and started. Compiled out entirely (always `false`)
/// when the `hid` feature is disabled, so callers always have the
/// simulator as a fallback.
#[cfg(feature = "hid")]
pub fn start_best_source(queue: crate::buffering::SampleQueue, run: RunFlag) -> bool {
    let (vid, pid) = resolve_ids();
    match HidMeterReader::create(vid, pid) {
        Some(reader) => {
            reader.start(queue, run);
            true
        }
        None => false,
    }
}

#[cfg(not(feature = "hid"))]
pub fn start_best_source(_queue: crate::buffering::SampleQueue, _run: RunFlag) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_with_prefix() {
        assert_eq!(parse_hex_u16("0x1fc9"), Some(0x1FC9));
        assert_eq!(parse_hex_u16("1fc9"), Some(0x1FC9));
        assert_eq!(parse_hex_u16("not-hex"), None);
    }

    #[test]
    fn run_flag_starts_running() {
        let flag = RunFlag::new();
        assert!(flag.is_running());
        flag.stop();
        assert!(!flag.is_running());
    }
}
