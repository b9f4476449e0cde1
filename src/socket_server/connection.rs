//! WebSocket connection handler
//!
//! Manages individual client connections, message routing, and room membership.

use std::collections::HashSet;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use crate::broadcaster::{ChannelHandle, RoomEvent};
use crate::error::PulseError;
use crate::schema::normalize_code;
use crate::socket_server::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;

/// Handle a single WebSocket connection
pub async fn handle_connection(stream: TcpStream, state: AppState) {
    let addr = stream.peer_addr().ok();
    tracing::info!("New connection from {:?}", addr);

    // Accept WebSocket handshake
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::error!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let mut conn = ConnectionState::new(ws_stream, state);
    conn.run().await;

    tracing::info!("Connection closed from {:?}", addr);
}

/// State for a single connection
struct ConnectionState {
    ws: WebSocketStream<TcpStream>,
    state: AppState,
    channel: ChannelHandle,
    room_rx: mpsc::Receiver<RoomEvent>,
    rooms: HashSet<String>,
}

impl ConnectionState {
    fn new(ws: WebSocketStream<TcpStream>, state: AppState) -> Self {
        let (channel, room_rx) = state.sessions.rooms().open_channel();
        Self {
            ws,
            state,
            channel,
            room_rx,
            rooms: HashSet::new(),
        }
    }

    async fn run(&mut self) {
        loop {
            tokio::select! {
                // Handle incoming WebSocket messages
                msg = self.ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_message(&text).await {
                                tracing::error!("Error handling message: {}", e);
                                let _ = self.send_error("internal_error", "Server error").await;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Channel {} requested close", self.channel.id());
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = self.ws.send(Message::Pong(data)).await;
                        }
                        Some(Err(e)) => {
                            tracing::error!("WebSocket error: {}", e);
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }

                // Forward room traffic in emission order
                event = self.room_rx.recv() => {
                    match event {
                        Some(event) => {
                            if self.send(&ServerMessage::from(event)).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            // Evicted by the broadcaster for falling behind
                            tracing::warn!("Channel {} dropped as a slow consumer", self.channel.id());
                            let _ = self.ws.close(None).await;
                            break;
                        }
                    }
                }
            }
        }

        // Cleanup on disconnect
        self.state.sessions.rooms().leave(self.channel.id());
        tracing::debug!(
            "Channel {} removed from {} rooms",
            self.channel.id(),
            self.rooms.len()
        );
    }

    async fn handle_message(&mut self, text: &str) -> anyhow::Result<()> {
        let msg: ClientMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("Malformed message from channel {}: {}", self.channel.id(), e);
                return self.send_error("bad_request", &e.to_string()).await;
            }
        };

        match msg {
            ClientMessage::JoinRoom { code } => {
                let code = normalize_code(&code);
                match self.state.sessions.join(&self.channel, &code) {
                    Ok(session) => {
                        self.rooms.insert(code.clone());
                        tracing::info!("Channel {} joined session {}", self.channel.id(), code);
                        self.send(&ServerMessage::Joined { code, session }).await?;
                    }
                    Err(PulseError::NotFound { code }) => {
                        self.send_error("not_found", &format!("Session not found: {}", code))
                            .await?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            ClientMessage::LeaveRoom { code } => {
                let code = normalize_code(&code);
                self.state
                    .sessions
                    .rooms()
                    .leave_room(self.channel.id(), &code);
                self.rooms.remove(&code);
            }

            ClientMessage::SendFeedback {
                code,
                reaction_type,
                timestamp,
            } => {
                // Stored events carry server time; the client clock is advisory
                let now = self.state.sessions.clock().now();
                if let Some(sent_at) = timestamp {
                    tracing::trace!("Client stamped reaction at {}", sent_at);
                }
                match self.state.ingest.submit_raw(&code, &reaction_type, now) {
                    Ok(_) => {}
                    Err(PulseError::StaleWriteIgnored { code, reason }) => {
                        tracing::debug!("Rejected feedback for {}: {}", code, reason);
                        self.send(&ServerMessage::FeedbackRejected { code, reason })
                            .await?;
                    }
                    Err(e) => {
                        // Fire-and-forget for the sender
                        tracing::error!("Error saving feedback for {}: {}", code, e);
                    }
                }
            }

            ClientMessage::Ping => {
                self.send(&ServerMessage::Pong).await?;
            }
        }

        Ok(())
    }

    async fn send(&mut self, msg: &ServerMessage) -> anyhow::Result<()> {
        let json = serde_json::to_string(msg)?;
        self.ws.send(Message::Text(json)).await?;
        Ok(())
    }

    async fn send_error(&mut self, code: &str, message: &str) -> anyhow::Result<()> {
        self.send(&ServerMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
        })
        .await
    }
}
