//! Shared daemon state
//!
//! One explicitly constructed set of services handed to both the REST router
//! and every WebSocket connection. There are no process-wide singletons.

use std::sync::Arc;

use crate::broadcaster::RoomBroadcaster;
use crate::clock::{Clock, SystemClock};
use crate::ingest::FeedbackIngest;
use crate::lifecycle::SessionService;
use crate::store::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub ingest: Arc<FeedbackIngest>,
}

impl AppState {
    /// Wire store, broadcaster, scheduler and ingestion together
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        let rooms = Arc::new(RoomBroadcaster::new());
        let sessions = SessionService::new(store, rooms, clock);
        let ingest = Arc::new(FeedbackIngest::new(Arc::clone(&sessions)));
        Self { sessions, ingest }
    }

    pub fn with_system_clock(store: Arc<dyn SessionStore>) -> Self {
        Self::new(store, Arc::new(SystemClock))
    }
}
