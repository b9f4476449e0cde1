//! Socket server protocol message types
//!
//! Defines the JSON message format for client-server communication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broadcaster::RoomEvent;
use crate::schema::{Feedback, Session};

/// Client-to-server message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the room of a session code
    JoinRoom { code: String },
    /// Leave one room
    LeaveRoom { code: String },
    /// Submit a reaction. `reactionType` stays untyped until ingestion so
    /// unknown kinds can be rejected instead of failing the whole message.
    #[serde(rename_all = "camelCase")]
    SendFeedback {
        code: String,
        reaction_type: serde_json::Value,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    /// Ping to check connection
    Ping,
}

/// Server-to-client message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Room joined; carries the current session state
    Joined { code: String, session: Session },
    /// A reaction arrived in a joined room
    FeedbackReceived { feedback: Feedback },
    /// A joined session was closed
    SessionClosed { code: String },
    /// The sender's reaction was not recorded
    FeedbackRejected { code: String, reason: String },
    /// Error response
    Error { code: String, message: String },
    /// Pong response
    Pong,
}

impl From<RoomEvent> for ServerMessage {
    fn from(event: RoomEvent) -> Self {
        match event {
            RoomEvent::FeedbackReceived { feedback } => Self::FeedbackReceived { feedback },
            RoomEvent::SessionClosed { code } => Self::SessionClosed { code },
        }
    }
}
