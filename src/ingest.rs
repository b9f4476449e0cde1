//! Feedback ingestion
//!
//! Validate, persist, then fan out. A reaction is only stored while its
//! session is active; everything else comes back as
//! [`PulseError::StaleWriteIgnored`] so the caller can decide whether to tell
//! the sender.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{PulseError, Result};
use crate::lifecycle::SessionService;
use crate::schema::{Feedback, ReactionType};

/// Reason strings carried by rejected submissions
pub mod reject {
    pub const NOT_FOUND: &str = "not_found";
    pub const CLOSED: &str = "closed";
    pub const UNKNOWN_REACTION: &str = "unknown_reaction";
}

/// Inbound reaction path
pub struct FeedbackIngest {
    sessions: Arc<SessionService>,
}

impl FeedbackIngest {
    pub fn new(sessions: Arc<SessionService>) -> Self {
        Self { sessions }
    }

    /// Record a reaction and deliver it to the session's room
    pub fn submit(
        &self,
        code: &str,
        reaction_type: ReactionType,
        timestamp: DateTime<Utc>,
    ) -> Result<Feedback> {
        let session = match self.sessions.get(code) {
            Ok(session) => session,
            Err(PulseError::NotFound { code }) => {
                return Err(stale(code, reject::NOT_FOUND));
            }
            Err(e) => return Err(e),
        };
        if !session.is_active {
            return Err(stale(session.code, reject::CLOSED));
        }

        self.sessions
            .record_feedback(&session.code, reaction_type, timestamp)
    }

    /// Decode an untyped wire value first; unknown kinds are rejected
    pub fn submit_raw(
        &self,
        code: &str,
        reaction: &serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<Feedback> {
        match ReactionType::from_json(reaction) {
            Some(reaction_type) => self.submit(code, reaction_type, timestamp),
            None => Err(stale(code, reject::UNKNOWN_REACTION)),
        }
    }
}

fn stale(code: impl Into<String>, reason: &str) -> PulseError {
    PulseError::StaleWriteIgnored {
        code: code.into(),
        reason: reason.to_string(),
    }
}
