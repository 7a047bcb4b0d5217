//! WebSocket transport: one handler per connection, fanning out broadcaster
//! events and routing inbound protocol messages.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use crate::protocol::{Message, MessageType};
use crate::router::MessageRouter;
use crate::state::AppState;

pub async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let router = MessageRouter::new(state.clone());
    let mut events = state.broadcaster.subscribe();

    let init = Message::init(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "hardwareConnected": state.broadcaster.hardware_connected(),
    }));
    if send(&mut ws_tx, &init).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(meter_event) => {
                        let msg = Message::new(MessageType::MeterEvent, serde_json::to_value(meter_event).unwrap_or_default());
                        if send(&mut ws_tx, &msg).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "client lagged behind meter event stream");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(raw))) => {
                        match Message::from_json(&raw) {
                            Ok(inbound) => {
                                let reply = router.route(inbound).await;
                                if send(&mut ws_tx, &reply).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                let _ = send(&mut ws_tx, &Message::error(format!("malformed message: {e}"))).await;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    info!("connection closed");
}

async fn send(
    tx: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>,
    msg: &Message,
) -> Result<(), axum::Error> {
    let json = msg.to_json().unwrap_or_else(|_| "{}".to_string());
    tx.send(WsMessage::Text(json.into())).await
}
