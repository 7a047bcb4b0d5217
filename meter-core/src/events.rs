//! Wire-shaped event types produced by the broadcaster (§3, §6).

use serde::{Deserialize, Serialize};

/// The closed set of 21 needle actions the classifier can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedleAction {
    Idle,
    Fall,
    LongFall,
    LongFallBlowdown,
    SpeededFall,
    Rise,
    ThetaBlink,
    RockSlam,
    Stuck,
    Floating,
    FreeNeedle,
    StageFour,
    BodyMotion,
    Squeeze,
    DirtyNeedle,
    NullTa,
    RocketRead,
    Tick,
    DoubleTick,
    Sticky,
    Null,
}

impl NeedleAction {
    pub fn is_floating(&self) -> bool {
        matches!(self, NeedleAction::Floating)
    }

    /// Candidates for end-phenomena consideration in the R3R machine.
    pub fn is_end_phenomena_candidate(&self) -> bool {
        matches!(self, NeedleAction::Floating | NeedleAction::FreeNeedle)
    }
}

impl Default for NeedleAction {
    fn default() -> Self {
        NeedleAction::Idle
    }
}

/// TA trend classification produced by the tone-arm tracker (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaTrend {
    Rising,
    Falling,
    Stable,
}

impl Default for TaTrend {
    fn default() -> Self {
        TaTrend::Stable
    }
}

/// Cumulative tone-arm motion for the current session (§4.E `session_ta_motion`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaMotion {
    pub total_down_motion: f64,
    pub total_up_motion: f64,
    pub net_motion: f64,
    pub start_ta: f64,
    pub current_ta: f64,
}

/// The live broadcast datum emitted by the broadcaster at 10 Hz (§3, §4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterEvent {
    pub timestamp: f64,
    pub needle_action: NeedleAction,
    pub position: f64,
    pub tone_arm: f64,
    pub sensitivity: f64,
    pub session_id: Option<String>,
    pub ta_trend: TaTrend,
    pub context: String,
    pub confidence: f64,
    pub hardware_connected: bool,
    pub samples_received: u64,
    pub raw_signal: f64,
    pub raw_unfiltered: f64,
    pub classified_at: f64,
    pub classify_window: f64,
    pub ta_motion: TaMotion,
}

impl Default for MeterEvent {
    fn default() -> Self {
        Self {
            timestamp: 0.0,
            needle_action: NeedleAction::Idle,
            position: 0.5,
            tone_arm: 2.0,
            sensitivity: 16.0,
            session_id: None,
            ta_trend: TaTrend::Stable,
            context: String::new(),
            confidence: 0.0,
            hardware_connected: false,
            samples_received: 0,
            raw_signal: 0.0,
            raw_unfiltered: 0.0,
            classified_at: 0.0,
            classify_window: 2.0,
            ta_motion: TaMotion::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needle_action_serializes_snake_case() {
        let json = serde_json::to_string(&NeedleAction::LongFallBlowdown).unwrap();
        assert_eq!(json, "\"long_fall_blowdown\"");
    }

    #[test]
    fn ta_trend_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&TaTrend::Rising).unwrap(), "\"RISING\"");
    }

    #[test]
    fn meter_event_round_trips_through_json() {
        let mut event = MeterEvent::default();
        event.needle_action = NeedleAction::Floating;
        event.position = 0.42;
        event.session_id = Some("sess-1".into());

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"needleAction\":\"floating\""));
        assert!(json.contains("\"toneArm\""));

        let decoded: MeterEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.needle_action, NeedleAction::Floating);
        assert_eq!(decoded.position, 0.42);
        assert_eq!(decoded.session_id.as_deref(), Some("sess-1"));
    }

    #[test]
    fn end_phenomena_candidates() {
        assert!(NeedleAction::Floating.is_end_phenomena_candidate());
        assert!(NeedleAction::FreeNeedle.is_end_phenomena_candidate());
        assert!(!NeedleAction::Fall.is_end_phenomena_candidate());
    }
}
