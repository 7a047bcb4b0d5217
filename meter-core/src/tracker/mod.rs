//! Tone-arm and charge trackers (§4.E, §4.F).

pub mod charge;
pub mod ta;

pub use charge::{ChargeAnalysis, ChargeTracker, QuestionCharge, QuestionSummary};
pub use ta::TaTracker;
