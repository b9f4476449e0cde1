//! classpulse: live classroom reaction sessions
//!
//! A presenter opens a session identified by a short code; participants join
//! by code and send one of four reactions, which are persisted and fanned out
//! to everyone in the session's room until the session closes, either by hand
//! or when its optional timer runs out.
//!
//! # Components
//!
//! ```text
//!   REST (axum)          WebSocket (tungstenite)
//!        │                    │            │
//!        ▼                    ▼            ▼
//!  SessionService ◄──── FeedbackIngest   RoomBroadcaster
//!    │        │                 │            ▲
//!    ▼        ▼                 ▼            │
//!  ExpiryScheduler      SessionStore (SQLite)│
//!    └──── close() ──────────────────────────┘
//! ```
//!
//! Closing happens in exactly one place, [`SessionService::close`], reached
//! from the end request, the expiry timer and the lazy check on read.

pub mod broadcaster;
pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod ingest;
pub mod lifecycle;
pub mod scheduler;
pub mod schema;
pub mod socket_server;
pub mod state;
pub mod store;

// Re-export commonly used types
pub use broadcaster::{ChannelHandle, ChannelId, RoomBroadcaster, RoomEvent};
pub use cli::{Cli, Commands, OutputFormat};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DaemonConfig;
pub use error::{PulseError, Result};
pub use identity::{Identity, Role};
pub use ingest::FeedbackIngest;
pub use lifecycle::SessionService;
pub use scheduler::{ArmOutcome, ExpiryHandler, ExpiryScheduler, RestoreReport};
pub use schema::{normalize_code, Feedback, NewSession, ReactionType, Session};
pub use state::AppState;
pub use store::{SessionStore, SqliteStore};
