//! Real-time socket server
//!
//! Every connected client gets one broadcaster channel. Joining a code adds
//! that channel to the code's room; room traffic and direct replies share the
//! same socket.
//!
//! # Protocol
//!
//! All messages are JSON over WebSocket:
//!
//! ```json
//! // Client -> Server
//! {"type": "join_room", "code": "K3X9QD"}
//! {"type": "send_feedback", "code": "K3X9QD", "reactionType": "confused"}
//!
//! // Server -> Client
//! {"type": "joined", "code": "K3X9QD", "session": {...}}
//! {"type": "feedback_received", "feedback": {...}}
//! {"type": "session_closed", "code": "K3X9QD"}
//! {"type": "feedback_rejected", "code": "K3X9QD", "reason": "closed"}
//! ```

pub mod connection;
pub mod protocol;

pub use connection::handle_connection;
pub use protocol::{ClientMessage, ServerMessage};

use tokio::net::TcpListener;

use crate::state::AppState;

/// Accept WebSocket clients until the listener fails permanently
pub async fn serve(listener: TcpListener, state: AppState) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tracing::debug!("Accepted connection from {}", addr);
                let state = state.clone();
                tokio::spawn(async move {
                    handle_connection(stream, state).await;
                });
            }
            Err(e) => {
                tracing::error!("Failed to accept connection: {}", e);
            }
        }
    }
}
