//! AI auditor collaborators implementing [`meter_core::AiAuditor`].

mod anthropic;
mod stub;

pub use anthropic::AnthropicAuditor;
pub use stub::StubAuditor;

/// The system prompt handed to every AI auditor call, adapted from the
/// original auditor persona: stay terse, stay in the auditor's voice, never
/// break the session's fourth wall.
pub const SYSTEM_PROMPT: &str = "\
You are an auditor running a structured session. Speak only as the auditor \
would: brief, neutral, never commenting on the mechanics of the session \
itself. You are given the current meter reading, session phase, and the \
preclear's last statement; respond with exactly what the auditor should say \
next, nothing else.";

pub const MAX_HISTORY: usize = 80;
