//! R3R structured-interview state machine (§4.H): the 9-step initial
//! sequence, the A-B-C-D cycle, and the earlier-similar/flow-termination
//! track, one transition fn per state variant.

use serde::{Deserialize, Serialize};

/// States of a Repetitive Rundown/Routine (R3R) pass over a single incident,
/// partitioned into the initial 9-step sequence, the A-B-C-D cycle, and the
/// termination track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum R3rState {
    LocateIncident,
    WhatHappened,
    Duration,
    Beginning,
    MoveThrough,
    WhatsHappening,
    MoveThroughAgain,
    AnythingAdded,
    TellMeAbout,
    Recall,
    When,
    WhatDidYouDo,
    AnythingElse,
    ErasingOrSolid,
    EarlierSimilar,
    ChainEp,
    CheckNextFlow,
    ItemComplete,
}

/// Ordered questions asked before the A-B-C-D cycle begins.
pub const INITIAL_SEQUENCE: [R3rState; 9] = [
    R3rState::LocateIncident,
    R3rState::WhatHappened,
    R3rState::Duration,
    R3rState::Beginning,
    R3rState::MoveThrough,
    R3rState::WhatsHappening,
    R3rState::MoveThroughAgain,
    R3rState::AnythingAdded,
    R3rState::TellMeAbout,
];

/// Which of the three rudiment flows is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Flow1,
    Flow2,
    Flow3,
}

impl Flow {
    /// The phrase substituted into `{flow_label}` in command templates.
    pub fn label(self) -> &'static str {
        match self {
            Flow::Flow1 => "done to you",
            Flow::Flow2 => "you did to another",
            Flow::Flow3 => "another did to others",
        }
    }
}

/// Per-incident context the machine advances through (§3 data model).
#[derive(Debug, Clone)]
pub struct R3rContext {
    pub state: R3rState,
    pub flow: Flow,
    pub abcd_count: u32,
    pub chain_depth: u32,
    pub fn_detected: bool,
    pub cognition_noted: bool,
    pub vgis_present: bool,
    pub flows_completed: Vec<Flow>,
    duration: Option<String>,
}

impl R3rContext {
    pub fn new() -> Self {
        Self {
            state: R3rState::LocateIncident,
            flow: Flow::Flow1,
            abcd_count: 0,
            chain_depth: 0,
            fn_detected: false,
            cognition_noted: false,
            vgis_present: false,
            flows_completed: Vec::new(),
            duration: None,
        }
    }
}

impl Default for R3rContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives an [`R3rContext`] through its transitions. One function per state
/// variant, dispatched from [`R3rStateMachine::transition`] — this keeps
/// each state's rule self-contained instead of one large match expression
/// carrying every state's logic inline.
pub struct R3rStateMachine;

impl R3rStateMachine {
    pub fn new() -> Self {
        Self
    }

    /// Returns the auditor's prompt template for the context's current state.
    pub fn get_command(&self, ctx: &R3rContext) -> String {
        let flow_label = ctx.flow.label();
        let duration = ctx.duration.as_deref().unwrap_or("the end");
        match ctx.state {
            R3rState::LocateIncident => format!("Locate an incident of {flow_label}."),
            R3rState::WhatHappened => "What happened?".to_string(),
            R3rState::Duration => "What is the duration of that incident?".to_string(),
            R3rState::Beginning => "Move to the beginning of that incident.".to_string(),
            R3rState::MoveThrough => format!("Move through the incident to a point {duration} later."),
            R3rState::WhatsHappening => "What's happening?".to_string(),
            R3rState::MoveThroughAgain => "Move through to the end of that incident.".to_string(),
            R3rState::AnythingAdded => "Is anything being added to that incident?".to_string(),
            R3rState::TellMeAbout => "Tell me about that.".to_string(),
            R3rState::Recall => "Recall the incident.".to_string(),
            R3rState::When => "When was it?".to_string(),
            R3rState::WhatDidYouDo => "What did you do?".to_string(),
            R3rState::AnythingElse => "Is there anything else about that incident?".to_string(),
            R3rState::ErasingOrSolid => "Is that incident erasing or going more solid?".to_string(),
            R3rState::EarlierSimilar => "Is there an earlier similar incident?".to_string(),
            R3rState::ChainEp => "How does it seem to you now?".to_string(),
            R3rState::CheckNextFlow => "Good. Let's check another flow.".to_string(),
            R3rState::ItemComplete => "Very good.".to_string(),
        }
    }

    /// Advances `ctx` one step, given the PC's response text and the latest
    /// meter/end-phenomena indicators.
    pub fn transition(&self, ctx: &mut R3rContext, pc_response: &str, floating_needle: bool, cognition: bool, vgis: bool) {
        if floating_needle {
            ctx.fn_detected = true;
        }
        if cognition {
            ctx.cognition_noted = true;
        }
        if vgis {
            ctx.vgis_present = true;
        }

        match ctx.state {
            R3rState::LocateIncident => self.from_locate_incident(ctx),
            R3rState::WhatHappened => self.from_what_happened(ctx),
            R3rState::Duration => self.from_duration(ctx, pc_response),
            R3rState::Beginning => self.from_beginning(ctx),
            R3rState::MoveThrough => self.from_move_through(ctx),
            R3rState::WhatsHappening => self.from_whats_happening(ctx),
            R3rState::MoveThroughAgain => self.from_move_through_again(ctx),
            R3rState::AnythingAdded => self.from_anything_added(ctx),
            R3rState::TellMeAbout => self.from_tell_me_about(ctx),
            R3rState::Recall => self.from_recall(ctx),
            R3rState::When => self.from_when(ctx),
            R3rState::WhatDidYouDo => self.from_what_did_you_do(ctx),
            R3rState::AnythingElse => self.from_anything_else(ctx),
            R3rState::ErasingOrSolid => self.from_erasing_or_solid(ctx, pc_response),
            R3rState::EarlierSimilar => self.from_earlier_similar(ctx, pc_response),
            R3rState::ChainEp => self.from_chain_ep(ctx),
            R3rState::CheckNextFlow => self.advance_flow(ctx),
            R3rState::ItemComplete => self.reset_for_new_item(ctx),
        }
    }

    fn from_locate_incident(&self, ctx: &mut R3rContext) {
        ctx.state = R3rState::WhatHappened;
    }

    fn from_what_happened(&self, ctx: &mut R3rContext) {
        ctx.state = R3rState::Duration;
    }

    fn from_duration(&self, ctx: &mut R3rContext, pc_response: &str) {
        let trimmed = pc_response.trim();
        ctx.duration = Some(if trimmed.is_empty() { "the end".to_string() } else { trimmed.to_string() });
        ctx.state = R3rState::Beginning;
    }

    fn from_beginning(&self, ctx: &mut R3rContext) {
        ctx.state = R3rState::MoveThrough;
    }

    fn from_move_through(&self, ctx: &mut R3rContext) {
        ctx.state = R3rState::WhatsHappening;
    }

    fn from_whats_happening(&self, ctx: &mut R3rContext) {
        ctx.state = R3rState::MoveThroughAgain;
    }

    fn from_move_through_again(&self, ctx: &mut R3rContext) {
        ctx.state = R3rState::AnythingAdded;
    }

    fn from_anything_added(&self, ctx: &mut R3rContext) {
        ctx.state = R3rState::TellMeAbout;
    }

    fn from_tell_me_about(&self, ctx: &mut R3rContext) {
        ctx.state = R3rState::Recall;
    }

    fn from_recall(&self, ctx: &mut R3rContext) {
        ctx.state = R3rState::When;
    }

    fn from_when(&self, ctx: &mut R3rContext) {
        ctx.state = R3rState::WhatDidYouDo;
    }

    fn from_what_did_you_do(&self, ctx: &mut R3rContext) {
        ctx.state = R3rState::AnythingElse;
    }

    fn from_anything_else(&self, ctx: &mut R3rContext) {
        ctx.abcd_count += 1;
        ctx.state = R3rState::ErasingOrSolid;
    }

    /// "erasing" or "lighter" repeats the A-B-C-D cycle on the same
    /// incident; any other answer ("solid", "more solid", ...) advances.
    fn from_erasing_or_solid(&self, ctx: &mut R3rContext, pc_response: &str) {
        let lower = pc_response.trim().to_lowercase();
        if lower.contains("erasing") || lower.contains("lighter") {
            ctx.state = R3rState::Recall;
        } else {
            ctx.state = R3rState::EarlierSimilar;
        }
    }

    fn from_earlier_similar(&self, ctx: &mut R3rContext, pc_response: &str) {
        let lower = pc_response.trim().to_lowercase();
        if lower.contains("yes") {
            ctx.chain_depth += 1;
            ctx.abcd_count = 0;
            ctx.state = R3rState::LocateIncident;
        } else {
            ctx.state = R3rState::ChainEp;
        }
    }

    fn from_chain_ep(&self, ctx: &mut R3rContext) {
        ctx.flows_completed.push(ctx.flow);
        let more_flows_remain = (ctx.flow == Flow::Flow1 && !ctx.flows_completed.contains(&Flow::Flow2))
            || (ctx.flow == Flow::Flow2 && !ctx.flows_completed.contains(&Flow::Flow3));
        ctx.state = if more_flows_remain { R3rState::CheckNextFlow } else { R3rState::ItemComplete };
    }

    /// Moves to the next uncompleted flow and restarts the 9-step sequence;
    /// resets the per-flow end-phenomena flags and cycle counters.
    fn advance_flow(&self, ctx: &mut R3rContext) {
        if !ctx.flows_completed.contains(&Flow::Flow2) {
            ctx.flow = Flow::Flow2;
        } else if !ctx.flows_completed.contains(&Flow::Flow3) {
            ctx.flow = Flow::Flow3;
        } else {
            ctx.state = R3rState::ItemComplete;
            return;
        }
        ctx.fn_detected = false;
        ctx.cognition_noted = false;
        ctx.vgis_present = false;
        ctx.abcd_count = 0;
        ctx.chain_depth = 0;
        ctx.state = R3rState::LocateIncident;
    }

    fn reset_for_new_item(&self, ctx: &mut R3rContext) {
        *ctx = R3rContext::new();
    }

    /// Records that the PC reported a cognition on the current incident.
    pub fn note_cognition(&self, ctx: &mut R3rContext) {
        ctx.cognition_noted = true;
    }

    /// Records a very good indicator (VGIs) on the current incident.
    pub fn note_vgis(&self, ctx: &mut R3rContext) {
        ctx.vgis_present = true;
    }
}

impl Default for R3rStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_sequence_runs_all_nine_steps_then_enters_abcd() {
        let machine = R3rStateMachine::new();
        let mut ctx = R3rContext::new();
        let expected = &INITIAL_SEQUENCE[1..];
        for state in expected {
            machine.transition(&mut ctx, "", false, false, false);
            assert_eq!(ctx.state, *state);
        }
        machine.transition(&mut ctx, "", false, false, false);
        assert_eq!(ctx.state, R3rState::Recall);
    }

    #[test]
    fn duration_answer_is_captured_and_interpolated_into_move_through() {
        let machine = R3rStateMachine::new();
        let mut ctx = R3rContext::new();
        ctx.state = R3rState::Duration;
        machine.transition(&mut ctx, "about three minutes", false, false, false);
        assert_eq!(ctx.state, R3rState::Beginning);
        ctx.state = R3rState::MoveThrough;
        assert_eq!(machine.get_command(&ctx), "Move through the incident to a point about three minutes later.");
    }

    #[test]
    fn erasing_or_solid_repeats_cycle_on_erasing_response() {
        let machine = R3rStateMachine::new();
        let mut ctx = R3rContext::new();
        ctx.state = R3rState::ErasingOrSolid;
        machine.transition(&mut ctx, "It's erasing", false, false, false);
        assert_eq!(ctx.state, R3rState::Recall);
    }

    #[test]
    fn erasing_or_solid_advances_to_earlier_similar_on_solid_response() {
        let machine = R3rStateMachine::new();
        let mut ctx = R3rContext::new();
        ctx.state = R3rState::ErasingOrSolid;
        machine.transition(&mut ctx, "It's solid", false, false, false);
        assert_eq!(ctx.state, R3rState::EarlierSimilar);
    }

    #[test]
    fn earlier_similar_yes_deepens_chain_and_restarts_sequence() {
        let machine = R3rStateMachine::new();
        let mut ctx = R3rContext::new();
        ctx.state = R3rState::EarlierSimilar;
        ctx.abcd_count = 3;
        machine.transition(&mut ctx, "yes", false, false, false);
        assert_eq!(ctx.state, R3rState::LocateIncident);
        assert_eq!(ctx.chain_depth, 1);
        assert_eq!(ctx.abcd_count, 0);
    }

    #[test]
    fn earlier_similar_no_advances_to_chain_ep() {
        let machine = R3rStateMachine::new();
        let mut ctx = R3rContext::new();
        ctx.state = R3rState::EarlierSimilar;
        machine.transition(&mut ctx, "no", false, false, false);
        assert_eq!(ctx.state, R3rState::ChainEp);
    }

    #[test]
    fn flow_advances_through_all_three_then_completes_item() {
        let machine = R3rStateMachine::new();
        let mut ctx = R3rContext::new();
        assert_eq!(ctx.flow, Flow::Flow1);

        ctx.state = R3rState::ChainEp;
        machine.transition(&mut ctx, "", false, false, false);
        assert_eq!(ctx.state, R3rState::CheckNextFlow);

        machine.transition(&mut ctx, "", false, false, false);
        assert_eq!(ctx.flow, Flow::Flow2);
        assert_eq!(ctx.state, R3rState::LocateIncident);

        ctx.state = R3rState::ChainEp;
        machine.transition(&mut ctx, "", false, false, false);
        assert_eq!(ctx.state, R3rState::CheckNextFlow);

        machine.transition(&mut ctx, "", false, false, false);
        assert_eq!(ctx.flow, Flow::Flow3);
        assert_eq!(ctx.state, R3rState::LocateIncident);

        ctx.state = R3rState::ChainEp;
        machine.transition(&mut ctx, "", false, false, false);
        assert_eq!(ctx.state, R3rState::ItemComplete);
    }

    #[test]
    fn item_complete_resets_everything_for_a_new_item() {
        let machine = R3rStateMachine::new();
        let mut ctx = R3rContext::new();
        ctx.flow = Flow::Flow3;
        ctx.chain_depth = 2;
        ctx.flows_completed = vec![Flow::Flow1, Flow::Flow2];
        ctx.state = R3rState::ItemComplete;
        machine.transition(&mut ctx, "", false, false, false);
        assert_eq!(ctx.state, R3rState::LocateIncident);
        assert_eq!(ctx.flow, Flow::Flow1);
        assert_eq!(ctx.chain_depth, 0);
        assert!(ctx.flows_completed.is_empty());
    }

    #[test]
    fn flow_label_matches_required_phrasing() {
        assert_eq!(Flow::Flow1.label(), "done to you");
        assert_eq!(Flow::Flow2.label(), "you did to another");
        assert_eq!(Flow::Flow3.label(), "another did to others");
    }
}
