//! Message router (§4.J): dispatches an incoming [`Message`] to the
//! appropriate handler, always returning a reply (never propagating a raw
//! error to the caller).

use std::sync::Arc;

use meter_core::session::{SessionManager, SessionMode, SessionPhase};
use meter_core::MeterEvent;
use serde_json::json;
use uuid::Uuid;

use crate::ai;
use crate::protocol::{Message, MessageType};
use crate::state::{AppState, PcProfile};

pub struct MessageRouter {
    state: Arc<AppState>,
}

impl MessageRouter {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Dispatches one inbound message. Every branch returns a [`Message`];
    /// handler errors are caught and turned into `Message::error` rather
    /// than closing the connection.
    pub async fn route(&self, msg: Message) -> Message {
        let result = match msg.message_type {
            MessageType::Ping => Ok(Message::pong()),
            MessageType::PcCreate => self.handle_pc_create(msg.payload).await,
            MessageType::PcUpdate => self.handle_pc_update(msg.payload).await,
            MessageType::PcDelete => self.handle_pc_delete(msg.payload).await,
            MessageType::PcList => self.handle_pc_list().await,
            MessageType::SessionCreate => self.handle_session_create(msg.payload).await,
            MessageType::SessionList => self.handle_session_list().await,
            MessageType::SessionStart => self.handle_session_start(msg.payload).await,
            MessageType::SessionEnd => self.handle_session_end().await,
            MessageType::SessionPause => self.handle_session_pause().await,
            MessageType::SessionResume => self.handle_session_resume().await,
            MessageType::SessionRecover => self.handle_session_recover().await,
            MessageType::PcInput => self.handle_pc_input(msg.payload).await,
            MessageType::MeterHistory => self.handle_meter_history().await,
            MessageType::AudioInput => self.handle_audio_input(msg.payload).await,
            other => Err(anyhow::anyhow!("unsupported message type: {other:?}")),
        };

        result.unwrap_or_else(Message::error)
    }

    async fn handle_pc_create(&self, payload: serde_json::Value) -> anyhow::Result<Message> {
        let id = Uuid::new_v4().to_string();
        let profile = PcProfile {
            id: id.clone(),
            first_name: payload["firstName"].as_str().unwrap_or_default().to_string(),
            last_name: payload["lastName"].as_str().unwrap_or_default().to_string(),
            notes: payload["notes"].as_str().unwrap_or_default().to_string(),
        };
        self.state.pc_profiles.lock().insert(id.clone(), profile.clone());
        Ok(Message::new(MessageType::PcCreated, serde_json::to_value(profile)?))
    }

    async fn handle_pc_update(&self, payload: serde_json::Value) -> anyhow::Result<Message> {
        let id = payload["id"].as_str().ok_or_else(|| anyhow::anyhow!("missing id"))?;
        let mut profiles = self.state.pc_profiles.lock();
        let profile = profiles.get_mut(id).ok_or_else(|| anyhow::anyhow!("unknown pc id: {id}"))?;
        if let Some(v) = payload["firstName"].as_str() {
            profile.first_name = v.to_string();
        }
        if let Some(v) = payload["lastName"].as_str() {
            profile.last_name = v.to_string();
        }
        if let Some(v) = payload["notes"].as_str() {
            profile.notes = v.to_string();
        }
        Ok(Message::new(MessageType::PcUpdated, serde_json::to_value(profile.clone())?))
    }

    async fn handle_pc_delete(&self, payload: serde_json::Value) -> anyhow::Result<Message> {
        let id = payload["id"].as_str().ok_or_else(|| anyhow::anyhow!("missing id"))?;
        self.state.pc_profiles.lock().remove(id);
        Ok(Message::new(MessageType::PcDeleted, json!({ "id": id })))
    }

    async fn handle_pc_list(&self) -> anyhow::Result<Message> {
        let profiles: Vec<PcProfile> = self.state.pc_profiles.lock().values().cloned().collect();
        Ok(Message::new(MessageType::PcList, serde_json::to_value(profiles)?))
    }

    /// Registers a session header for a PC without entering the active
    /// START_RUDIMENTS flow — `session.start` is the separate operation
    /// that actually begins driving the phase machine (§6).
    async fn handle_session_create(&self, payload: serde_json::Value) -> anyhow::Result<Message> {
        let pc_id = payload["pcId"].as_str().ok_or_else(|| anyhow::anyhow!("missing pcId"))?.to_string();
        let session_id = Uuid::new_v4().to_string();
        self.state.case_store.persist_session_header(&session_id, &pc_id, SessionPhase::Setup).await?;
        Ok(Message::new(MessageType::SessionCreated, json!({ "sessionId": session_id, "pcId": pc_id })))
    }

    async fn handle_session_list(&self) -> anyhow::Result<Message> {
        let sessions = self.state.case_store.list_sessions().await?;
        Ok(Message::new(MessageType::SessionListData, json!({ "sessions": sessions })))
    }

    /// Starts a new session, forcibly replacing any existing active session
    /// without emitting a visible "ended" event for it (§4.J).
    async fn handle_session_start(&self, payload: serde_json::Value) -> anyhow::Result<Message> {
        if !self.state.try_begin_session_start() {
            return Err(anyhow::anyhow!("a session-start is already in flight"));
        }
        let result = self.do_session_start(payload).await;
        self.state.end_session_start();
        result
    }

    async fn do_session_start(&self, payload: serde_json::Value) -> anyhow::Result<Message> {
        let pc_id = payload["pcId"].as_str().unwrap_or("unknown").to_string();
        let mode = match payload["mode"].as_str() {
            Some("conversational") => SessionMode::Conversational,
            _ => SessionMode::Structured,
        };
        let session_id = Uuid::new_v4().to_string();

        // Swap in the new session and pull out the prior one (if any) before
        // any `.await` — the lock guards must not cross an await point.
        let (prior, first_line) = {
            let mut active = self.state.active_session.lock();
            let prior = active.take();
            let mut charge = self.state.charge_tracker.lock();
            let mut manager = SessionManager::new(session_id.clone(), pc_id.clone(), mode, now_secs());
            let first_line = manager.start(&mut charge, now_secs());
            *active = Some(manager);
            (prior, first_line)
        };

        if let Some(prior) = prior {
            let _ = self
                .state
                .case_store
                .persist_session_header(&prior.session_id, &prior.pc_id, SessionPhase::Complete)
                .await;
        }

        self.state.broadcaster.set_session_id(Some(session_id.clone()));
        self.state.case_store.persist_session_header(&session_id, &pc_id, SessionPhase::StartRudiments).await?;

        Ok(Message::new(
            MessageType::SessionStarted,
            json!({ "sessionId": session_id, "firstPrompt": first_line }),
        ))
    }

    async fn handle_session_end(&self) -> anyhow::Result<Message> {
        let manager = {
            let mut active = self.state.active_session.lock();
            active.take().ok_or_else(|| anyhow::anyhow!("no active session"))?
        };
        self.state.broadcaster.set_session_id(None);

        let charge_map = if manager.mode == SessionMode::Conversational {
            let mut tracker = self.state.charge_tracker.lock();
            tracker.finalize_active();
            Some(tracker.get_charge_map())
        } else {
            None
        };

        self.state
            .case_store
            .persist_session_header(&manager.session_id, &manager.pc_id, SessionPhase::Complete)
            .await?;

        Ok(Message::new(MessageType::SessionEnded, json!({ "sessionId": manager.session_id, "chargeMap": charge_map })))
    }

    async fn handle_session_pause(&self) -> anyhow::Result<Message> {
        let mut active = self.state.active_session.lock();
        let manager = active.as_mut().ok_or_else(|| anyhow::anyhow!("no active session"))?;
        manager.pause(now_secs());
        Ok(Message::new(MessageType::StateChange, json!({ "paused": true })))
    }

    async fn handle_session_resume(&self) -> anyhow::Result<Message> {
        let mut active = self.state.active_session.lock();
        let manager = active.as_mut().ok_or_else(|| anyhow::anyhow!("no active session"))?;
        manager.resume(now_secs());
        Ok(Message::new(MessageType::StateChange, json!({ "paused": false })))
    }

    async fn handle_session_recover(&self) -> anyhow::Result<Message> {
        let active = self.state.active_session.lock();
        let manager = active.as_ref().ok_or_else(|| anyhow::anyhow!("no active session to recover"))?;
        Ok(Message::new(
            MessageType::SessionRecovered,
            json!({
                "sessionId": manager.session_id,
                "phase": manager.phase,
                "turns": manager.turns(),
                "isPaused": true,
            }),
        ))
    }

    async fn handle_meter_history(&self) -> anyhow::Result<Message> {
        let readings = self.state.broadcaster.recent_readings(500);
        Ok(Message::new(MessageType::MeterHistoryData, json!({ "readings": readings })))
    }

    async fn handle_pc_input(&self, payload: serde_json::Value) -> anyhow::Result<Message> {
        let text = payload["text"].as_str().unwrap_or_default().to_string();

        let meter: MeterEvent = {
            let mut rx = self.state.broadcaster.subscribe();
            rx.try_recv().unwrap_or_default()
        };

        // Do all the synchronous state mutation first, collecting everything
        // the async tail needs as owned values, so no lock guard is held
        // across an `.await`.
        let (session_id, mode, mut line, charge_snapshot, last_turn) = {
            let mut active = self.state.active_session.lock();
            let manager = active.as_mut().ok_or_else(|| anyhow::anyhow!("no active session"))?;
            let mut charge = self.state.charge_tracker.lock();

            let (line, charge_snapshot) = manager.process_pc_input(&text, &meter, &mut charge, now_secs());
            let last_turn = manager.turns().last().expect("process_pc_input always appends a turn").clone();
            (manager.session_id.clone(), manager.mode, line, charge_snapshot, last_turn)
        };

        if let Some(auditor) = &self.state.ai_auditor {
            if mode == SessionMode::Conversational {
                let context = format!(
                    "{}\n\nMeter: action={:?} position={:.2}\nPC said: {text}",
                    ai::SYSTEM_PROMPT,
                    meter.needle_action,
                    meter.position,
                );
                if let Ok(reply) = auditor.respond(&context, &text).await {
                    line = reply;
                }
            }
        }

        self.state.case_store.persist_turn(&session_id, &last_turn).await?;

        Ok(Message::new(
            MessageType::ChatMessage,
            json!({ "text": line, "chargeSnapshot": charge_snapshot }),
        ))
    }

    async fn handle_audio_input(&self, payload: serde_json::Value) -> anyhow::Result<Message> {
        let Some(stt) = &self.state.speech_to_text else {
            return Err(anyhow::anyhow!("speech-to-text is not configured"));
        };
        let b64 = payload["audio"].as_str().ok_or_else(|| anyhow::anyhow!("missing audio field"))?;
        let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64)?;
        let mime = payload["mimeType"].as_str().unwrap_or("audio/webm");
        let text = stt.transcribe(&bytes, mime).await?;
        Ok(Message::new(MessageType::AudioTranscribed, json!({ "text": text })))
    }
}

fn now_secs() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}
