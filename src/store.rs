//! Session store
//!
//! The single shared mutable resource of the daemon: sessions and their
//! feedback events, kept in SQLite. Every statement runs under one connection
//! lock, which makes the close transition and the "only while active" rule for
//! feedback atomic per record.
//!
//! # Schema
//!
//! ```text
//! sessions(code PK, owner_id, name, description, duration_minutes, created_at, is_active)
//! feedback(id PK, session_code, reaction_type, timestamp)
//! ```
//!
//! Timestamps are stored as Unix milliseconds.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{PulseError, Result};
use crate::schema::{normalize_code, Feedback, NewSession, ReactionType, Session, CODE_LENGTH};

/// How many fresh codes to try before giving up on a create
pub const MAX_CODE_ATTEMPTS: usize = 16;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Produces candidate session codes
pub type CodeGenerator = Box<dyn Fn() -> String + Send + Sync>;

/// Draw a random 6-character code from `[A-Z0-9]`
pub fn random_code() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    bytes[..CODE_LENGTH]
        .iter()
        .map(|b| CODE_ALPHABET[*b as usize % CODE_ALPHABET.len()] as char)
        .collect()
}

/// Result of a close request against the store
#[derive(Debug, Clone)]
pub struct CloseOutcome {
    /// Session state after the call
    pub session: Session,
    /// True only for the call that flipped `is_active` from true to false
    pub transitioned: bool,
}

/// Persistence contract for sessions and feedback
pub trait SessionStore: Send + Sync {
    /// Persist a new active session under a freshly generated unique code
    fn create(&self, new: NewSession, created_at: DateTime<Utc>) -> Result<Session>;

    fn find_by_code(&self, code: &str) -> Result<Option<Session>>;

    /// Sessions of one owner, newest first
    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Session>>;

    /// Every session still flagged active
    fn list_active(&self) -> Result<Vec<Session>>;

    /// Idempotent close; `NotFound` if the code never existed
    fn mark_closed(&self, code: &str) -> Result<CloseOutcome>;

    /// Append a reaction. Fails with `StaleWriteIgnored` unless the session is
    /// active at the moment of the write.
    fn append_feedback(
        &self,
        session_code: &str,
        reaction_type: ReactionType,
        timestamp: DateTime<Utc>,
    ) -> Result<Feedback>;

    /// Feedback of one session, oldest first
    fn list_feedback(&self, session_code: &str) -> Result<Vec<Feedback>>;
}

/// SQLite-backed [`SessionStore`]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    codes: CodeGenerator,
}

impl SqliteStore {
    /// Open (or create) a store file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Open a throwaway store that lives as long as this value
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open by config value, where `:memory:` selects [`SqliteStore::in_memory`]
    pub fn open_location(location: &str) -> Result<Self> {
        if location == ":memory:" {
            Self::in_memory()
        } else {
            Self::open(Path::new(location))
        }
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            codes: Box::new(random_code),
        })
    }

    /// Replace the code source (deterministic codes in tests)
    pub fn with_code_generator(mut self, codes: CodeGenerator) -> Self {
        self.codes = codes;
        self
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                code TEXT PRIMARY KEY NOT NULL,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                duration_minutes INTEGER,
                created_at INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_owner ON sessions(owner_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_active ON sessions(is_active);

            CREATE TABLE IF NOT EXISTS feedback (
                id TEXT PRIMARY KEY NOT NULL,
                session_code TEXT NOT NULL,
                reaction_type TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_feedback_session ON feedback(session_code, timestamp);
            "#,
        )?;
        Ok(())
    }

    fn select_session(conn: &Connection, code: &str) -> Result<Option<Session>> {
        let session = conn
            .query_row(
                "SELECT code, owner_id, name, description, duration_minutes, created_at, is_active
                 FROM sessions WHERE code = ?1",
                params![code],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    fn select_sessions(conn: &Connection, sql: &str, arg: Option<&str>) -> Result<Vec<Session>> {
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = match arg {
            Some(value) => stmt.query_map(params![value], session_from_row)?,
            None => stmt.query_map([], session_from_row)?,
        };
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }
}

impl SessionStore for SqliteStore {
    fn create(&self, new: NewSession, created_at: DateTime<Utc>) -> Result<Session> {
        let new = new.validated()?;
        let conn = self.conn.lock();

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = normalize_code(&(self.codes)());
            if Self::select_session(&conn, &code)?.is_some() {
                tracing::debug!("Code {} already taken (attempt {})", code, attempt);
                continue;
            }

            let inserted = conn.execute(
                "INSERT INTO sessions (code, owner_id, name, description, duration_minutes, created_at, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
                params![
                    code,
                    new.owner_id,
                    new.name,
                    new.description,
                    new.duration_minutes,
                    created_at.timestamp_millis(),
                ],
            );

            match inserted {
                Ok(_) => {
                    return Ok(Session {
                        code,
                        owner_id: new.owner_id,
                        name: new.name,
                        description: new.description,
                        duration_minutes: new.duration_minutes,
                        created_at: millis_to_utc(created_at.timestamp_millis()),
                        is_active: true,
                    });
                }
                // Another writer on the same file got there first
                Err(e) if is_constraint_violation(&e) => {
                    tracing::debug!("Code {} hit unique constraint (attempt {})", code, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PulseError::CodeSpaceExhausted {
            attempts: MAX_CODE_ATTEMPTS,
        })
    }

    fn find_by_code(&self, code: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        Self::select_session(&conn, &normalize_code(code))
    }

    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Session>> {
        let conn = self.conn.lock();
        Self::select_sessions(
            &conn,
            "SELECT code, owner_id, name, description, duration_minutes, created_at, is_active
             FROM sessions WHERE owner_id = ?1
             ORDER BY created_at DESC, rowid DESC",
            Some(owner_id),
        )
    }

    fn list_active(&self) -> Result<Vec<Session>> {
        let conn = self.conn.lock();
        Self::select_sessions(
            &conn,
            "SELECT code, owner_id, name, description, duration_minutes, created_at, is_active
             FROM sessions WHERE is_active = 1
             ORDER BY created_at ASC, rowid ASC",
            None,
        )
    }

    fn mark_closed(&self, code: &str) -> Result<CloseOutcome> {
        let code = normalize_code(code);
        let conn = self.conn.lock();

        // Compare-and-set: only the caller that sees is_active = 1 changes a row
        let changed = conn.execute(
            "UPDATE sessions SET is_active = 0 WHERE code = ?1 AND is_active = 1",
            params![code],
        )?;

        let session =
            Self::select_session(&conn, &code)?.ok_or_else(|| PulseError::not_found(&code))?;

        Ok(CloseOutcome {
            session,
            transitioned: changed == 1,
        })
    }

    fn append_feedback(
        &self,
        session_code: &str,
        reaction_type: ReactionType,
        timestamp: DateTime<Utc>,
    ) -> Result<Feedback> {
        let session_code = normalize_code(session_code);
        let id = Uuid::new_v4();
        let conn = self.conn.lock();

        let inserted = conn.execute(
            "INSERT INTO feedback (id, session_code, reaction_type, timestamp)
             SELECT ?1, code, ?3, ?4 FROM sessions WHERE code = ?2 AND is_active = 1",
            params![
                id.to_string(),
                session_code,
                reaction_type.as_str(),
                timestamp.timestamp_millis(),
            ],
        )?;

        if inserted == 0 {
            let reason = match Self::select_session(&conn, &session_code)? {
                Some(_) => "closed",
                None => "not_found",
            };
            return Err(PulseError::StaleWriteIgnored {
                code: session_code,
                reason: reason.to_string(),
            });
        }

        Ok(Feedback {
            id,
            session_code,
            reaction_type,
            timestamp: millis_to_utc(timestamp.timestamp_millis()),
        })
    }

    fn list_feedback(&self, session_code: &str) -> Result<Vec<Feedback>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, session_code, reaction_type, timestamp
             FROM feedback WHERE session_code = ?1
             ORDER BY timestamp ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![normalize_code(session_code)], feedback_from_row)?;

        let mut feedback = Vec::new();
        for row in rows {
            feedback.push(row?);
        }
        Ok(feedback)
    }
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        code: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        duration_minutes: row.get(4)?,
        created_at: millis_to_utc(row.get(5)?),
        is_active: row.get(6)?,
    })
}

fn feedback_from_row(row: &Row<'_>) -> rusqlite::Result<Feedback> {
    let raw_id: String = row.get(0)?;
    let id = Uuid::parse_str(&raw_id).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let raw_reaction: String = row.get(2)?;
    let reaction_type = ReactionType::parse(&raw_reaction).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown reaction type '{}'", raw_reaction).into(),
        )
    })?;

    Ok(Feedback {
        id,
        session_code: row.get(1)?,
        reaction_type,
        timestamp: millis_to_utc(row.get(3)?),
    })
}
