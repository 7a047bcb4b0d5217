//! Shared server state: the broadcaster, the single active session, and
//! the collaborator handles the router dispatches through.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use meter_core::session::SessionManager;
use meter_core::tracker::ChargeTracker;
use meter_core::{AiAuditor, Broadcaster, CaseStore, SpeechToText};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;

/// Minimal PC profile record, kept in memory. Session/transcript data is
/// durable (via [`CaseStore`]); PC profile durability is out of scope for
/// this server's storage layer — see DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcProfile {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub notes: String,
}

pub struct AppState {
    pub config: ServerConfig,
    pub broadcaster: Arc<Broadcaster>,
    pub charge_tracker: Arc<Mutex<ChargeTracker>>,
    pub active_session: Mutex<Option<SessionManager>>,
    pub session_starting: AtomicBool,
    pub pc_profiles: Mutex<HashMap<String, PcProfile>>,
    pub ai_auditor: Option<Arc<dyn AiAuditor>>,
    pub speech_to_text: Option<Arc<dyn SpeechToText>>,
    pub case_store: Arc<dyn CaseStore>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        broadcaster: Arc<Broadcaster>,
        ai_auditor: Option<Arc<dyn AiAuditor>>,
        speech_to_text: Option<Arc<dyn SpeechToText>>,
        case_store: Arc<dyn CaseStore>,
    ) -> Self {
        Self {
            config,
            broadcaster,
            charge_tracker: Arc::new(Mutex::new(ChargeTracker::new())),
            active_session: Mutex::new(None),
            session_starting: AtomicBool::new(false),
            pc_profiles: Mutex::new(HashMap::new()),
            ai_auditor,
            speech_to_text,
            case_store,
        }
    }

    /// Acquires the single-session-start-in-flight guard; returns `false`
    /// if another start is already in progress (§4.J concurrency rule).
    pub fn try_begin_session_start(&self) -> bool {
        self.session_starting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_session_start(&self) {
        self.session_starting.store(false, Ordering::Release);
    }
}
