use thiserror::Error;

/// Errors surfaced by the signal pipeline, device reader, and session engine.
///
/// Most failure modes in this crate are recoverable by design (§7 of the
/// design notes: device faults fall back to the simulator, collaborator
/// faults fall back to canonical prompts) and are logged rather than
/// propagated. This enum exists for the subset of failures that a caller
/// must observe: device-open failures the caller explicitly requested,
/// and session-phase violations.
#[derive(Debug, Error)]
pub enum MeterError {
    #[error("HID device not found (vid={vid:#06x}, pid={pid:#06x})")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("failed to open HID device: {0}")]
    DeviceOpen(String),

    #[error("HID read error: {0}")]
    DeviceRead(String),

    #[error("session already running")]
    AlreadyRunning,

    #[error("no active session")]
    NotRunning,

    #[error("session phase violation: cannot advance from {from} via {action}")]
    PhaseViolation { from: &'static str, action: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MeterError>;
