//! Session and feedback records
//!
//! These are the shapes stored by [`crate::store::SessionStore`] and sent over
//! both the REST and the WebSocket surfaces. Field names serialize in
//! camelCase, which is what the browser client expects.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PulseError, Result};

/// Length of generated session codes
pub const CODE_LENGTH: usize = 6;

/// Canonicalize a user-typed session code (trimmed, upper-case)
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// A presenter-owned live feedback window, addressed by its short code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub code: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    /// Absent means the session only closes through an explicit end
    pub duration_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Session {
    /// Wall-clock instant at which the session closes on its own
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.duration_minutes
            .map(|minutes| self.created_at + Duration::minutes(i64::from(minutes)))
    }

    /// True when the session still reads as active but its timer window has passed
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expiry) => self.is_active && now > expiry,
            None => false,
        }
    }
}

/// Presenter input for a new session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSession {
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: Option<u32>,
}

impl NewSession {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    /// Trim text fields and reject missing owner, missing name or a zero duration
    pub fn validated(self) -> Result<Self> {
        let owner_id = self.owner_id.trim().to_string();
        let name = self.name.trim().to_string();
        if owner_id.is_empty() {
            return Err(PulseError::validation("ownerId is required"));
        }
        if name.is_empty() {
            return Err(PulseError::validation("name is required"));
        }
        if self.duration_minutes == Some(0) {
            return Err(PulseError::validation(
                "durationMinutes must be a positive integer",
            ));
        }
        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(Self {
            owner_id,
            name,
            description,
            duration_minutes: self.duration_minutes,
        })
    }
}

/// The four fixed reaction signals a participant can send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionType {
    Happy,
    Unhappy,
    Surprised,
    Confused,
}

impl ReactionType {
    pub const ALL: [ReactionType; 4] = [
        ReactionType::Happy,
        ReactionType::Unhappy,
        ReactionType::Surprised,
        ReactionType::Confused,
    ];

    /// Decode a wire value. Accepts the canonical tags, the older
    /// `smiley`/`frowny` names and the ordinals 0-3.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "happy" | "smiley" | "0" => Some(Self::Happy),
            "unhappy" | "frowny" | "1" => Some(Self::Unhappy),
            "surprised" | "2" => Some(Self::Surprised),
            "confused" | "3" => Some(Self::Confused),
            _ => None,
        }
    }

    /// Decode a JSON value that may be a string or a number
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::parse(s),
            serde_json::Value::Number(n) => n.as_u64().and_then(|ordinal| {
                Self::ALL
                    .into_iter()
                    .find(|kind| u64::from(kind.ordinal()) == ordinal)
            }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Unhappy => "unhappy",
            Self::Surprised => "surprised",
            Self::Confused => "confused",
        }
    }

    /// Stable wire number, 0-3 in declaration order
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    /// Display glyph for terminal output
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Happy => ":)",
            Self::Unhappy => ":(",
            Self::Surprised => ":O",
            Self::Confused => ":/",
        }
    }
}

impl std::fmt::Display for ReactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One participant reaction, immutable once stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: Uuid,
    pub session_code: String,
    pub reaction_type: ReactionType,
    pub timestamp: DateTime<Utc>,
}
