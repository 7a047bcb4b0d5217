//! Session manager (§4.I): the phase machine layered on top of the R3R
//! state machine, plus the collaborator traits the server implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::events::MeterEvent;
use crate::r3r::{R3rContext, R3rStateMachine};
use crate::tracker::{ChargeAnalysis, ChargeTracker};

/// Whether a session follows the scripted R3R machine or free-form chat
/// paced by the AI collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Structured,
    Conversational,
}

/// The five-phase session lifecycle (§3). Strictly monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionPhase {
    Setup,
    StartRudiments,
    Processing,
    EndRudiments,
    Complete,
}

impl SessionPhase {
    fn next(self) -> SessionPhase {
        match self {
            SessionPhase::Setup => SessionPhase::StartRudiments,
            SessionPhase::StartRudiments => SessionPhase::Processing,
            SessionPhase::Processing => SessionPhase::EndRudiments,
            SessionPhase::EndRudiments => SessionPhase::Complete,
            SessionPhase::Complete => SessionPhase::Complete,
        }
    }
}

pub const START_RUDIMENTS: [&str; 4] = [
    "What are your goals for this session?",
    "Look around the room. Can you have that wall? That ceiling? That floor? Good.",
    "Is there anything you'd like to say to me before we start?",
    "Has anything been suppressed or invalidated since last session?",
];

pub const END_RUDIMENTS: [&str; 5] = [
    "Have your goals for this session been met?",
    "Is there anything you'd like to say to me?",
    "Look around the room. Can you have that wall? That ceiling? That floor? Good.",
    "Has anything been suppressed or invalidated this session?",
    "Is it all right with you if we end this session?",
];

const END_OF_SESSION_LINE: &str = "That is the end of this session. Thank you.";
const CONVERSATIONAL_FALLBACK: &str = "Thank you. Tell me more about that.";

/// One recorded turn of the session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_number: u64,
    pub speaker: Speaker,
    pub text: String,
    pub needle_action: Option<String>,
    pub tone_arm: Option<f64>,
    pub iso_timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Auditor,
    Pc,
}

/// An AI collaborator capable of paraphrasing a prompt or replying in
/// conversational mode, given the live meter/session context.
#[async_trait]
pub trait AiAuditor: Send + Sync {
    async fn respond(&self, system_context: &str, user_message: &str) -> anyhow::Result<String>;

    /// The model identifier, surfaced in session telemetry and error logs.
    fn model_name(&self) -> &str;
}

/// Speech-to-text collaborator for recorded audio turns.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> anyhow::Result<String>;
}

/// A session header row as surfaced to `session.list` (§6), without the
/// full transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub pc_id: String,
    pub phase: String,
    pub updated_at: String,
}

/// Persistence boundary for PC profiles and session headers/turns.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn persist_turn(&self, session_id: &str, turn: &Turn) -> anyhow::Result<()>;
    async fn persist_session_header(&self, session_id: &str, pc_id: &str, phase: SessionPhase) -> anyhow::Result<()>;
    async fn list_sessions(&self) -> anyhow::Result<Vec<SessionSummary>>;
}

/// Drives one active session through its phases, delegating prompt wording
/// to the R3R machine (structured mode) or an AI collaborator
/// (conversational mode), and recording every turn.
pub struct SessionManager {
    pub session_id: String,
    pub pc_id: String,
    pub mode: SessionMode,
    pub phase: SessionPhase,
    turn_number: u64,
    start_rudiment_index: usize,
    end_rudiment_index: usize,
    r3r: R3rStateMachine,
    r3r_ctx: Option<R3rContext>,
    turns: Vec<Turn>,
    paused: bool,
    elapsed_at_pause: f64,
    started_at: f64,
    pause_started_at: Option<f64>,
}

impl SessionManager {
    pub fn new(session_id: impl Into<String>, pc_id: impl Into<String>, mode: SessionMode, now: f64) -> Self {
        Self {
            session_id: session_id.into(),
            pc_id: pc_id.into(),
            mode,
            phase: SessionPhase::Setup,
            turn_number: 0,
            start_rudiment_index: 0,
            end_rudiment_index: 0,
            r3r: R3rStateMachine::new(),
            r3r_ctx: None,
            turns: Vec::new(),
            paused: false,
            elapsed_at_pause: 0.0,
            started_at: now,
            pause_started_at: None,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Enters START_RUDIMENTS and emits the first rudiment prompt.
    pub fn start(&mut self, charge: &mut ChargeTracker, now: f64) -> String {
        self.started_at = now;
        self.phase = SessionPhase::StartRudiments;
        self.record_auditor_turn(START_RUDIMENTS[0], charge, now);
        START_RUDIMENTS[0].to_string()
    }

    pub fn pause(&mut self, now: f64) {
        if !self.paused {
            self.paused = true;
            self.pause_started_at = Some(now);
        }
    }

    pub fn resume(&mut self, now: f64) {
        if self.paused {
            if let Some(pause_started) = self.pause_started_at.take() {
                self.elapsed_at_pause += now - pause_started;
            }
            self.paused = false;
        }
    }

    pub fn elapsed_seconds(&self, now: f64) -> f64 {
        let in_flight_pause = self.pause_started_at.map(|p| now - p).unwrap_or(0.0);
        now - self.started_at - self.elapsed_at_pause - in_flight_pause
    }

    /// Advances the session given a PC's spoken/typed input and the meter
    /// reading at the moment of that input. Returns the auditor's next line.
    ///
    /// Order of operations follows the turn-record invariant: increment
    /// turn, snapshot charge before advancing, persist, broadcast, then run
    /// the phase-specific advance.
    pub fn process_pc_input(&mut self, text: &str, meter: &MeterEvent, charge: &mut ChargeTracker, now: f64) -> (String, ChargeAnalysis) {
        self.turn_number += 1;
        let charge_snapshot = charge.get_analysis();
        self.record_pc_turn(text, meter, now);

        let next_line = match self.phase {
            SessionPhase::StartRudiments => self.advance_start_rudiments(charge, now),
            SessionPhase::Processing if self.mode == SessionMode::Structured => {
                self.advance_processing_structured(text, meter, charge, now)
            }
            SessionPhase::Processing => self.advance_conversational(charge, now),
            SessionPhase::EndRudiments => self.advance_end_rudiments(charge, now),
            SessionPhase::Setup | SessionPhase::Complete => String::new(),
        };

        (next_line, charge_snapshot)
    }

    fn advance_start_rudiments(&mut self, charge: &mut ChargeTracker, now: f64) -> String {
        self.start_rudiment_index += 1;
        if self.start_rudiment_index >= START_RUDIMENTS.len() {
            self.phase = SessionPhase::Processing;
            self.r3r_ctx = Some(R3rContext::new());
            let line = "Let's begin processing.".to_string();
            self.record_auditor_turn(&line, charge, now);
            line
        } else {
            let line = START_RUDIMENTS[self.start_rudiment_index];
            self.record_auditor_turn(line, charge, now);
            line.to_string()
        }
    }

    fn advance_processing_structured(&mut self, text: &str, meter: &MeterEvent, charge: &mut ChargeTracker, now: f64) -> String {
        let Some(ctx) = &mut self.r3r_ctx else {
            return String::new();
        };
        let fn_detected = meter.needle_action.is_floating();
        self.r3r.transition(ctx, text, fn_detected, false, false);
        let line = self.r3r.get_command(ctx);
        self.record_auditor_turn(&line, charge, now);
        line
    }

    /// Conversational mode has no R3R context; the caller (session router)
    /// is expected to have already asked the AI collaborator and fall back
    /// to this canonical line if that call failed.
    fn advance_conversational(&mut self, charge: &mut ChargeTracker, now: f64) -> String {
        self.record_auditor_turn(CONVERSATIONAL_FALLBACK, charge, now);
        CONVERSATIONAL_FALLBACK.to_string()
    }

    fn advance_end_rudiments(&mut self, charge: &mut ChargeTracker, now: f64) -> String {
        self.end_rudiment_index += 1;
        if self.end_rudiment_index >= END_RUDIMENTS.len() {
            self.phase = SessionPhase::Complete;
            self.record_auditor_turn(END_OF_SESSION_LINE, charge, now);
            END_OF_SESSION_LINE.to_string()
        } else {
            let line = END_RUDIMENTS[self.end_rudiment_index];
            self.record_auditor_turn(line, charge, now);
            line.to_string()
        }
    }

    /// Transitions PROCESSING → END_RUDIMENTS and emits the first end
    /// rudiment. Distinct from the automatic advances above because ending
    /// processing is an explicit operator/AI decision, not a per-turn one.
    pub fn begin_end_rudiments(&mut self, charge: &mut ChargeTracker, now: f64) -> String {
        self.phase = SessionPhase::EndRudiments;
        self.end_rudiment_index = 0;
        self.record_auditor_turn(END_RUDIMENTS[0], charge, now);
        END_RUDIMENTS[0].to_string()
    }

    /// Records an auditor-originated line and, per the turn-record
    /// invariant, starts the charge tracker's reaction window for it — every
    /// auditor prompt emission doubles as a charge-tracker question drop.
    fn record_auditor_turn(&mut self, text: &str, charge: &mut ChargeTracker, now: f64) {
        charge.question_dropped(text.to_string(), now);
        self.turns.push(Turn {
            turn_number: self.turn_number,
            speaker: Speaker::Auditor,
            text: text.to_string(),
            needle_action: None,
            tone_arm: None,
            iso_timestamp: iso_from_secs(now),
        });
    }

    fn record_pc_turn(&mut self, text: &str, meter: &MeterEvent, now: f64) {
        self.turns.push(Turn {
            turn_number: self.turn_number,
            speaker: Speaker::Pc,
            text: text.to_string(),
            needle_action: Some(format!("{:?}", meter.needle_action)),
            tone_arm: Some(meter.tone_arm),
            iso_timestamp: iso_from_secs(now),
        });
    }
}

fn iso_from_secs(secs: f64) -> String {
    // Intentionally dependency-light: a full chrono round trip belongs at
    // the server boundary, where timestamps are actually persisted.
    format!("{:.3}", secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_manager(mode: SessionMode) -> SessionManager {
        SessionManager::new("sess-1", "pc-1", mode, 0.0)
    }

    #[test]
    fn start_emits_first_rudiment() {
        let mut manager = fresh_manager(SessionMode::Structured);
        let mut charge = ChargeTracker::new();
        let line = manager.start(&mut charge, 0.0);
        assert_eq!(line, START_RUDIMENTS[0]);
        assert_eq!(manager.phase, SessionPhase::StartRudiments);
    }

    #[test]
    fn start_rudiments_advance_to_processing_after_fourth() {
        let mut manager = fresh_manager(SessionMode::Structured);
        let mut charge = ChargeTracker::new();
        manager.start(&mut charge, 0.0);
        let meter = MeterEvent::default();
        for _ in 0..3 {
            manager.process_pc_input("ok", &meter, &mut charge, 1.0);
        }
        assert_eq!(manager.phase, SessionPhase::StartRudiments);
        manager.process_pc_input("ok", &meter, &mut charge, 1.0);
        assert_eq!(manager.phase, SessionPhase::Processing);
    }

    #[test]
    fn end_rudiments_reach_complete_after_fifth_with_terminal_line() {
        let mut manager = fresh_manager(SessionMode::Structured);
        manager.phase = SessionPhase::EndRudiments;
        let mut charge = ChargeTracker::new();
        let meter = MeterEvent::default();
        let mut last_line = String::new();
        for _ in 0..5 {
            let (line, _) = manager.process_pc_input("ok", &meter, &mut charge, 1.0);
            last_line = line;
        }
        assert_eq!(manager.phase, SessionPhase::Complete);
        assert_eq!(last_line, END_OF_SESSION_LINE);
    }

    #[test]
    fn pause_resume_accounts_for_elapsed_time() {
        let mut manager = fresh_manager(SessionMode::Structured);
        manager.pause(10.0);
        manager.resume(15.0);
        assert_eq!(manager.elapsed_seconds(20.0), 15.0);
    }

    #[test]
    fn conversational_mode_falls_back_without_ai() {
        let mut manager = fresh_manager(SessionMode::Conversational);
        manager.phase = SessionPhase::Processing;
        let mut charge = ChargeTracker::new();
        let meter = MeterEvent::default();
        let (line, _) = manager.process_pc_input("hello", &meter, &mut charge, 1.0);
        assert_eq!(line, CONVERSATIONAL_FALLBACK);
    }
}
