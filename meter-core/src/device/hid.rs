//! `hidapi`-backed Theta-Meter reader. Runs on a dedicated OS thread — the
//! `hidapi` blocking read doesn't compose with the async broadcaster loop,
//! so samples cross over the [`SampleQueue`].

use std::thread::{self, JoinHandle};
use std::time::Duration;

use hidapi::HidApi;
use tracing::{info, warn};

use crate::buffering::SampleQueue;
use crate::device::{RunFlag, RECONNECT_DELAY};
use crate::error::{MeterError, Result};
use crate::pipeline::SignalPipeline;

const ADC_SCALE: f64 = 1_650_000.0 / 8_388_608.0;
const REPORT_LEN: usize = 64;
const READ_TIMEOUT_MS: i32 = 100;

/// Owns an open HID handle and the per-session signal pipeline, and drives
/// the background read loop.
pub struct HidMeterReader {
    vid: u16,
    pid: u16,
}

impl HidMeterReader {
    /// Probes for the device; returns `None` (never an error) when it isn't
    /// present, so callers can fall back to the simulator (§4.A/4.B).
    pub fn create(vid: u16, pid: u16) -> Option<Self> {
        let api = HidApi::new().ok()?;
        let found = api.device_list().any(|d| d.vendor_id() == vid && d.product_id() == pid);
        if !found {
            warn!(vid, pid, "Theta-Meter not found — falling back to simulator");
            return None;
        }
        info!(vid, pid, "Theta-Meter found");
        Some(Self { vid, pid })
    }

    /// Spawns the background read thread. Samples are pushed to `queue` as
    /// `(timestamp, position, tone_arm_placeholder, smoothed_raw, raw_adc)` —
    /// the tone-arm component is filled in by the broadcaster, not here.
    pub fn start(self, queue: SampleQueue, run: RunFlag) -> JoinHandle<()> {
        thread::spawn(move || self.read_loop(queue, run))
    }

    fn read_loop(self, queue: SampleQueue, run: RunFlag) {
        let mut pipeline = SignalPipeline::new();
        let mut t = 0.0f64;
        let dt = 1.0 / crate::device::POLL_RATE_HZ;

        while run.is_running() {
            let api = match HidApi::new() {
                Ok(api) => api,
                Err(e) => {
                    warn!(error = %e, "hidapi init failed, retrying");
                    thread::sleep(RECONNECT_DELAY);
                    continue;
                }
            };
            let device = match api.open(self.vid, self.pid) {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, "failed to open Theta-Meter, retrying");
                    thread::sleep(RECONNECT_DELAY);
                    continue;
                }
            };

            let mut buf = [0u8; REPORT_LEN];
            while run.is_running() {
                match device.read_timeout(&mut buf, READ_TIMEOUT_MS) {
                    Ok(n) if n > 0 => {
                        if let Some(raw_adc) = parse_report(&buf[..n]) {
                            let out = pipeline.process(raw_adc);
                            queue.push((t, out.position, 0.0, out.smoothed_raw, raw_adc));
                            t += dt;
                        }
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "HID read error, reconnecting");
                        break;
                    }
                }
            }
            if run.is_running() {
                thread::sleep(RECONNECT_DELAY);
            }
        }
    }
}

/// Parses a report id 0x01 frame: 24-bit big-endian ADC reading at bytes[2..5].
fn parse_report(data: &[u8]) -> Option<f64> {
    if data.len() < 5 || data[0] != 0x01 {
        return None;
    }
    let raw = ((data[2] as u32) << 16) | ((data[3] as u32) << 8) | (data[4] as u32);
    Some(raw as f64 * ADC_SCALE)
}

/// Opens the device and returns a [`MeterError`] instead of falling back,
/// for callers that explicitly requested hardware (e.g. a CLI `--require-hw`
/// flag) rather than the opportunistic `create()` probe.
pub fn open_or_err(vid: u16, pid: u16) -> Result<HidMeterReader> {
    HidMeterReader::create(vid, pid).ok_or(MeterError::DeviceNotFound { vid, pid })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_report_rejects_wrong_report_id() {
        let mut buf = [0u8; REPORT_LEN];
        buf[0] = 0x02;
        assert!(parse_report(&buf).is_none());
    }

    #[test]
    fn parse_report_decodes_24bit_value() {
        let mut buf = [0u8; REPORT_LEN];
        buf[0] = 0x01;
        buf[2] = 0x12;
        buf[3] = 0x34;
        buf[4] = 0x56;
        let raw = 0x123456u32;
        let expected = raw as f64 * ADC_SCALE;
        assert_eq!(parse_report(&buf), Some(expected));
    }

    #[test]
    fn parse_report_rejects_short_buffer() {
        assert!(parse_report(&[0x01, 0x00]).is_none());
    }
}
