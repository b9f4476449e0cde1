//! Expiry scheduler
//!
//! One-shot tokio timers that close a timed session at
//! `createdAt + durationMinutes`. Timers live only in process memory, so a
//! fresh process must call [`ExpiryScheduler::reconcile`] against the store
//! before serving; sessions that expired while the process was down are closed
//! on the spot.
//!
//! Firing goes through [`ExpiryHandler::on_expiry`], which is expected to be
//! idempotent. A timer that fires after its session was closed some other way
//! is therefore harmless, but [`ExpiryScheduler::cancel`] frees it early.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::error::Result;
use crate::schema::Session;
use crate::store::SessionStore;

/// Receiver of timer firings
pub trait ExpiryHandler: Send + Sync + 'static {
    fn on_expiry(&self, code: &str);
}

/// What [`ExpiryScheduler::arm`] did with a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// Manual-close session, or already inactive
    Skipped,
    /// Expiry instant already passed; the handler ran synchronously
    ExpiredNow,
    /// A timer will fire after this delay
    Scheduled(Duration),
    /// Called outside a tokio runtime; only lazy expiry will close it
    NoRuntime,
}

/// Counts from a startup reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub armed: usize,
    pub closed: usize,
}

struct ArmedTimer {
    id: u64,
    handle: JoinHandle<()>,
}

/// Per-session timer table
pub struct ExpiryScheduler {
    clock: Arc<dyn Clock>,
    timers: Arc<Mutex<HashMap<String, ArmedTimer>>>,
    next_timer: AtomicU64,
}

impl ExpiryScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_timer: AtomicU64::new(1),
        }
    }

    /// Arrange for `handler` to be told when `session` expires.
    ///
    /// Re-arming a code replaces its previous timer.
    pub fn arm(&self, session: &Session, handler: Arc<dyn ExpiryHandler>) -> ArmOutcome {
        let Some(expires_at) = session.expires_at() else {
            return ArmOutcome::Skipped;
        };
        if !session.is_active {
            return ArmOutcome::Skipped;
        }

        let remaining = expires_at - self.clock.now();
        let delay = match remaining.to_std() {
            Ok(delay) if !delay.is_zero() => delay,
            _ => {
                tracing::info!("Session {} already past expiry, closing now", session.code);
                handler.on_expiry(&session.code);
                return ArmOutcome::ExpiredNow;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                "No async runtime to arm expiry for {}; relying on lazy expiry",
                session.code
            );
            return ArmOutcome::NoRuntime;
        };

        let code = session.code.clone();
        let id = self.next_timer.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<dyn ExpiryHandler> = Arc::downgrade(&handler);

        // Hold the table while spawning so a short timer cannot fire before
        // its entry exists.
        let mut timers = self.timers.lock();
        let table = Arc::clone(&self.timers);
        let task_code = code.clone();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            let current = {
                let mut timers = table.lock();
                match timers.get(&task_code) {
                    Some(armed) if armed.id == id => {
                        timers.remove(&task_code);
                        true
                    }
                    _ => false,
                }
            };
            if !current {
                return;
            }

            tracing::info!("Expiry timer fired for {}", task_code);
            match weak.upgrade() {
                Some(handler) => handler.on_expiry(&task_code),
                None => tracing::debug!("Expiry handler gone, dropping timer for {}", task_code),
            }
        });

        if let Some(previous) = timers.insert(code.clone(), ArmedTimer { id, handle }) {
            previous.handle.abort();
        }
        drop(timers);

        tracing::info!(
            "Scheduling auto-close for {} in {}s",
            code,
            delay.as_secs()
        );
        ArmOutcome::Scheduled(delay)
    }

    /// Drop a pending timer. Returns true if one was armed.
    pub fn cancel(&self, code: &str) -> bool {
        match self.timers.lock().remove(code) {
            Some(armed) => {
                armed.handle.abort();
                tracing::debug!("Cancelled expiry timer for {}", code);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, code: &str) -> bool {
        self.timers.lock().contains_key(code)
    }

    /// Number of timers still pending
    pub fn armed_count(&self) -> usize {
        self.timers.lock().len()
    }

    /// Re-arm every session the store still marks active
    pub fn reconcile(
        &self,
        store: &dyn SessionStore,
        handler: Arc<dyn ExpiryHandler>,
    ) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();
        for session in store.list_active()? {
            match self.arm(&session, Arc::clone(&handler)) {
                ArmOutcome::Scheduled(_) => report.armed += 1,
                ArmOutcome::ExpiredNow => report.closed += 1,
                ArmOutcome::Skipped | ArmOutcome::NoRuntime => {}
            }
        }
        tracing::info!(
            "Restored timers for {} active sessions ({} closed as overdue)",
            report.armed,
            report.closed
        );
        Ok(report)
    }

    /// Abort every pending timer
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock();
        for (_, armed) in timers.drain() {
            armed.handle.abort();
        }
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
