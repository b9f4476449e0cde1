//! Self-declared login identities
//!
//! There is no credential check: a login mints a fresh opaque id for whatever
//! username and role the client declares.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PulseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Presenter who opens sessions
    Professor,
    /// Participant who joins by code
    Student,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "professor" | "presenter" => Some(Self::Professor),
            "student" | "participant" => Some(Self::Student),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

/// Mint an identity for a declared username and role
pub fn login(username: &str, role: &str) -> Result<Identity> {
    let username = username.trim();
    if username.is_empty() {
        return Err(PulseError::validation("username is required"));
    }
    let role = Role::parse(role)
        .ok_or_else(|| PulseError::validation(format!("unknown role '{}'", role.trim())))?;

    Ok(Identity {
        id: Uuid::new_v4(),
        username: username.to_string(),
        role,
    })
}
