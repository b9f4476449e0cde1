//! Session lifecycle
//!
//! `Active -> Closed` is the only transition a session makes. The explicit end
//! request, the expiry timer and the lazy check on read all funnel into
//! [`SessionService::close`]; the store's compare-and-set decides which caller
//! performed the transition, and only that caller notifies the room.
//!
//! Feedback fan-out and the close notification share one lock, so a room
//! never sees `feedback_received` after `session_closed`.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::broadcaster::{ChannelHandle, RoomBroadcaster, RoomEvent};
use crate::clock::Clock;
use crate::error::{PulseError, Result};
use crate::scheduler::{ArmOutcome, ExpiryHandler, ExpiryScheduler, RestoreReport};
use crate::schema::{normalize_code, Feedback, NewSession, ReactionType, Session};
use crate::store::SessionStore;

/// Orchestrates store, scheduler and room broadcaster
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    rooms: Arc<RoomBroadcaster>,
    scheduler: ExpiryScheduler,
    clock: Arc<dyn Clock>,
    /// Held across every store write that is followed by a room broadcast
    fanout: Mutex<()>,
    this: Weak<SessionService>,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        rooms: Arc<RoomBroadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            store,
            rooms,
            scheduler: ExpiryScheduler::new(Arc::clone(&clock)),
            clock,
            fanout: Mutex::new(()),
            this: this.clone(),
        })
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn rooms(&self) -> &Arc<RoomBroadcaster> {
        &self.rooms
    }

    pub fn scheduler(&self) -> &ExpiryScheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn expiry_handler(&self) -> Option<Arc<dyn ExpiryHandler>> {
        self.this
            .upgrade()
            .map(|service| service as Arc<dyn ExpiryHandler>)
    }

    /// Create a session and arm its timer if it has a duration
    pub fn create(&self, new: NewSession) -> Result<Session> {
        let session = self.store.create(new, self.clock.now())?;
        tracing::info!(
            "Created session {} for owner {} ({})",
            session.code,
            session.owner_id,
            session
                .duration_minutes
                .map(|m| format!("{} min", m))
                .unwrap_or_else(|| "manual close".to_string())
        );

        if let Some(handler) = self.expiry_handler() {
            if self.scheduler.arm(&session, handler) == ArmOutcome::ExpiredNow {
                return self.current(&session.code);
            }
        }
        Ok(session)
    }

    /// Look up a session, closing it first if its window has already passed
    pub fn get(&self, code: &str) -> Result<Session> {
        let session = self.current(code)?;
        self.settle(session)
    }

    /// Owner-triggered close. Anyone who knows the code may end it.
    pub fn end(&self, code: &str) -> Result<Session> {
        self.close(code)
    }

    /// Put a channel in a session's room and return the session's state.
    ///
    /// Membership comes first, so a close racing with the join (including
    /// the lazy one triggered by this very read) still reaches the channel.
    pub fn join(&self, channel: &ChannelHandle, code: &str) -> Result<Session> {
        let code = normalize_code(code);
        self.rooms.join(channel, &code);
        match self.get(&code) {
            Ok(session) => Ok(session),
            Err(e) => {
                self.rooms.leave_room(channel.id(), &code);
                Err(e)
            }
        }
    }

    /// Store a reaction for an active session and fan it out
    pub fn record_feedback(
        &self,
        code: &str,
        reaction_type: ReactionType,
        timestamp: DateTime<Utc>,
    ) -> Result<Feedback> {
        let _fanout = self.fanout.lock();
        let feedback = self.store.append_feedback(code, reaction_type, timestamp)?;
        let delivered = self.rooms.broadcast(
            &feedback.session_code,
            RoomEvent::FeedbackReceived {
                feedback: feedback.clone(),
            },
        );
        tracing::debug!(
            "Feedback {} ({}) for {} delivered to {} channels",
            feedback.id,
            feedback.reaction_type,
            feedback.session_code,
            delivered
        );
        Ok(feedback)
    }

    /// The single idempotent close path
    pub fn close(&self, code: &str) -> Result<Session> {
        let _fanout = self.fanout.lock();
        let outcome = self.store.mark_closed(code)?;
        if outcome.transitioned {
            let code = &outcome.session.code;
            self.scheduler.cancel(code);
            let notified = self.rooms.broadcast(
                code,
                RoomEvent::SessionClosed {
                    code: code.clone(),
                },
            );
            tracing::info!("Session {} closed ({} listeners notified)", code, notified);
        }
        Ok(outcome.session)
    }

    /// Sessions of one owner, newest first, with overdue ones closed
    pub fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Session>> {
        self.store
            .list_by_owner(owner_id.trim())?
            .into_iter()
            .map(|session| self.settle(session))
            .collect()
    }

    /// Stored feedback of a session, oldest first
    pub fn list_feedback(&self, code: &str) -> Result<Vec<Feedback>> {
        self.store.list_feedback(code)
    }

    /// Startup pass: re-arm timers for every active session in the store
    pub fn restore_timers(&self) -> Result<RestoreReport> {
        match self.expiry_handler() {
            Some(handler) => self.scheduler.reconcile(self.store.as_ref(), handler),
            None => Ok(RestoreReport::default()),
        }
    }

    fn current(&self, code: &str) -> Result<Session> {
        let code = normalize_code(code);
        self.store
            .find_by_code(&code)?
            .ok_or(PulseError::NotFound { code })
    }

    /// Lazy expiry: covers downtime and missed timers
    fn settle(&self, session: Session) -> Result<Session> {
        if session.is_overdue(self.clock.now()) {
            tracing::info!("Session {} overdue on read, closing", session.code);
            return self.close(&session.code);
        }
        Ok(session)
    }
}

impl ExpiryHandler for SessionService {
    fn on_expiry(&self, code: &str) {
        if let Err(e) = self.close(code) {
            // The next read closes it lazily
            tracing::error!("Failed to auto-close session {}: {}", code, e);
        }
    }
}
