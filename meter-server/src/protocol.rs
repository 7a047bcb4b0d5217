//! Wire protocol envelope (§6): the closed set of message types exchanged
//! over the WebSocket connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of request/response message kinds (§6). `ChargeMap` is
/// an addition over the original protocol — see DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Ping,
    Pong,
    Init,
    Error,

    #[serde(rename = "pc.create")]
    PcCreate,
    #[serde(rename = "pc.created")]
    PcCreated,
    #[serde(rename = "pc.update")]
    PcUpdate,
    #[serde(rename = "pc.updated")]
    PcUpdated,
    #[serde(rename = "pc.delete")]
    PcDelete,
    #[serde(rename = "pc.deleted")]
    PcDeleted,
    #[serde(rename = "pc.list")]
    PcList,
    #[serde(rename = "pc.input")]
    PcInput,

    #[serde(rename = "session.create")]
    SessionCreate,
    #[serde(rename = "session.created")]
    SessionCreated,
    #[serde(rename = "session.list")]
    SessionList,
    #[serde(rename = "session.list.data")]
    SessionListData,
    #[serde(rename = "session.start")]
    SessionStart,
    #[serde(rename = "session.end")]
    SessionEnd,
    #[serde(rename = "session.pause")]
    SessionPause,
    #[serde(rename = "session.resume")]
    SessionResume,
    #[serde(rename = "session.recover")]
    SessionRecover,
    #[serde(rename = "session.recovered")]
    SessionRecovered,
    #[serde(rename = "session.started")]
    SessionStarted,
    #[serde(rename = "session.ended")]
    SessionEnded,

    #[serde(rename = "meter.event")]
    MeterEvent,
    #[serde(rename = "meter.history")]
    MeterHistory,
    #[serde(rename = "meter.history.data")]
    MeterHistoryData,

    #[serde(rename = "state.change")]
    StateChange,
    #[serde(rename = "transcript.update")]
    TranscriptUpdate,

    #[serde(rename = "chat.message")]
    ChatMessage,
    #[serde(rename = "chat.typing")]
    ChatTyping,

    #[serde(rename = "audio.input")]
    AudioInput,
    #[serde(rename = "audio.transcribed")]
    AudioTranscribed,

    #[serde(rename = "db.status")]
    DbStatus,

    /// Per-question reaction scores, emitted on session end in
    /// conversational mode (resolved open question — see DESIGN.md).
    #[serde(rename = "charge.map")]
    ChargeMap,
}

/// A single envelope exchanged over the WebSocket connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl Message {
    pub fn new(message_type: MessageType, payload: Value) -> Self {
        Self { message_type, request_id: None, payload }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(MessageType::Error, serde_json::json!({ "message": message.into() }))
    }

    pub fn pong() -> Self {
        Self::new(MessageType::Pong, Value::Null)
    }

    pub fn init(payload: Value) -> Self {
        Self::new(MessageType::Init, payload)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_types_serialize_to_dotted_wire_names() {
        assert_eq!(serde_json::to_string(&MessageType::PcInput).unwrap(), "\"pc.input\"");
        assert_eq!(serde_json::to_string(&MessageType::ChargeMap).unwrap(), "\"charge.map\"");
        assert_eq!(serde_json::to_string(&MessageType::SessionRecovered).unwrap(), "\"session.recovered\"");
        assert_eq!(serde_json::to_string(&MessageType::SessionCreated).unwrap(), "\"session.created\"");
        assert_eq!(serde_json::to_string(&MessageType::SessionListData).unwrap(), "\"session.list.data\"");
        assert_eq!(serde_json::to_string(&MessageType::MeterHistoryData).unwrap(), "\"meter.history.data\"");
        assert_eq!(serde_json::to_string(&MessageType::PcCreated).unwrap(), "\"pc.created\"");
    }

    #[test]
    fn message_round_trips_through_json() {
        let msg = Message::new(MessageType::ChatMessage, serde_json::json!({"text": "hi"}));
        let json = msg.to_json().unwrap();
        let decoded = Message::from_json(&json).unwrap();
        assert_eq!(decoded.message_type, MessageType::ChatMessage);
        assert_eq!(decoded.payload["text"], "hi");
    }

    #[test]
    fn error_helper_builds_error_message() {
        let msg = Message::error("bad request");
        assert_eq!(msg.message_type, MessageType::Error);
        assert_eq!(msg.payload["message"], "bad request");
    }
}
