//! Session lifecycle flows driven through the service layer
//!
//! Tokio's clock is paused in the timer tests, so a 60 second expiry runs
//! instantly. The `ManualClock` only matters for lazy expiry and restart
//! reconciliation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;

use classpulse::{Clock, NewSession, PulseError, ReactionType, RoomEvent, SessionStore};

use crate::common::{fixed_start, Harness};

fn drain(rx: &mut tokio::sync::mpsc::Receiver<RoomEvent>) -> Vec<RoomEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_timed_session_end_to_end() {
    let h = Harness::new();
    let sessions = &h.state.sessions;
    let session = sessions
        .create(NewSession::new("prof-1", "Lecture 1").with_duration(1))
        .unwrap();
    assert!(session.is_active);
    assert!(sessions.scheduler().is_armed(&session.code));

    let (a, mut rx_a) = sessions.rooms().open_channel();
    let (b, mut rx_b) = sessions.rooms().open_channel();
    sessions.rooms().join(&a, &session.code);
    sessions.rooms().join(&b, &session.code);

    let feedback = h
        .state
        .ingest
        .submit(&session.code, ReactionType::Happy, h.clock.now())
        .unwrap();

    for rx in [&mut rx_a, &mut rx_b] {
        assert_eq!(
            drain(rx),
            vec![RoomEvent::FeedbackReceived {
                feedback: feedback.clone()
            }]
        );
    }

    tokio::time::sleep(Duration::from_secs(61)).await;
    h.clock.advance(ChronoDuration::seconds(61));

    let closed = RoomEvent::SessionClosed {
        code: session.code.clone(),
    };
    assert_eq!(drain(&mut rx_a), vec![closed.clone()]);
    assert_eq!(drain(&mut rx_b), vec![closed]);
    assert!(!sessions.scheduler().is_armed(&session.code));

    let late = h
        .state
        .ingest
        .submit(&session.code, ReactionType::Happy, h.clock.now());
    assert!(matches!(late, Err(PulseError::StaleWriteIgnored { .. })));
    assert!(drain(&mut rx_a).is_empty());
    assert_eq!(sessions.list_feedback(&session.code).unwrap().len(), 1);
}

#[tokio::test]
async fn test_manual_session_never_arms_a_timer() {
    let h = Harness::new();
    let sessions = &h.state.sessions;
    let session = sessions
        .create(NewSession::new("prof-1", "Office hours"))
        .unwrap();
    assert_eq!(sessions.scheduler().armed_count(), 0);

    h.clock.advance(ChronoDuration::days(3));
    assert!(sessions.get(&session.code).unwrap().is_active);

    sessions.end(&session.code).unwrap();
    let after = sessions.get(&session.code).unwrap();
    assert!(!after.is_active);
    assert_eq!(sessions.scheduler().armed_count(), 0);
}

#[tokio::test]
async fn test_manual_end_cancels_pending_timer() {
    let h = Harness::new();
    let sessions = &h.state.sessions;
    let session = sessions
        .create(NewSession::new("prof-1", "Lab").with_duration(30))
        .unwrap();
    assert_eq!(sessions.scheduler().armed_count(), 1);

    sessions.end(&session.code).unwrap();
    assert_eq!(sessions.scheduler().armed_count(), 0);
}

#[tokio::test]
async fn test_lazy_expiry_closes_exactly_once() {
    let h = Harness::new();
    let sessions = &h.state.sessions;
    let session = sessions
        .create(NewSession::new("prof-1", "Quiz").with_duration(1))
        .unwrap();
    // Simulate a missed timer
    sessions.scheduler().cancel(&session.code);

    let (a, mut rx) = sessions.rooms().open_channel();
    sessions.rooms().join(&a, &session.code);

    h.clock.advance(ChronoDuration::minutes(2));
    for _ in 0..3 {
        assert!(!sessions.get(&session.code).unwrap().is_active);
    }
    assert_eq!(
        drain(&mut rx),
        vec![RoomEvent::SessionClosed {
            code: session.code.clone()
        }]
    );
}

#[tokio::test]
async fn test_concurrent_close_broadcasts_once() {
    let h = Harness::new();
    let sessions = Arc::clone(&h.state.sessions);
    let session = sessions.create(NewSession::new("prof-1", "Race")).unwrap();
    let (a, mut rx) = sessions.rooms().open_channel();
    sessions.rooms().join(&a, &session.code);

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let sessions = Arc::clone(&sessions);
            let code = session.code.clone();
            std::thread::spawn(move || sessions.close(&code).unwrap())
        })
        .collect();

    for thread in threads {
        let state = thread.join().unwrap();
        assert!(!state.is_active);
        assert_eq!(state.code, session.code);
    }
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn test_restart_reconciliation_closes_overdue_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.db");
    let start = fixed_start();

    let (overdue, pending, manual) = {
        let first = Harness::on_disk(&path, start);
        let overdue = first
            .state
            .sessions
            .create(NewSession::new("prof-1", "Morning").with_duration(1))
            .unwrap();
        let pending = first
            .state
            .sessions
            .create(NewSession::new("prof-1", "Afternoon").with_duration(60))
            .unwrap();
        let manual = first
            .state
            .sessions
            .create(NewSession::new("prof-1", "Open"))
            .unwrap();
        (overdue.code, pending.code, manual.code)
        // process "dies" here: timers are dropped with the scheduler
    };

    let second = Harness::on_disk(&path, start + ChronoDuration::minutes(5));
    let sessions = &second.state.sessions;
    let (a, mut rx) = sessions.rooms().open_channel();
    sessions.rooms().join(&a, &overdue);

    let report = sessions.restore_timers().unwrap();
    assert_eq!(report.closed, 1);
    assert_eq!(report.armed, 1);

    // Checked straight against the store: no read request was needed
    let stored = sessions.store().find_by_code(&overdue).unwrap().unwrap();
    assert!(!stored.is_active);
    assert_eq!(
        drain(&mut rx),
        vec![RoomEvent::SessionClosed { code: overdue }]
    );

    assert!(sessions.scheduler().is_armed(&pending));
    assert!(!sessions.scheduler().is_armed(&manual));
    assert_eq!(sessions.store().list_active().unwrap().len(), 2);
}

#[tokio::test]
async fn test_owner_history_and_feedback_replay_order() {
    let h = Harness::new();
    let sessions = &h.state.sessions;
    let first = sessions.create(NewSession::new("prof-1", "Week 1")).unwrap();
    h.clock.advance(ChronoDuration::hours(1));
    let second = sessions.create(NewSession::new("prof-1", "Week 2")).unwrap();
    sessions.create(NewSession::new("prof-2", "Other")).unwrap();

    let history: Vec<_> = sessions
        .list_by_owner("prof-1")
        .unwrap()
        .into_iter()
        .map(|s| s.code)
        .collect();
    assert_eq!(history, vec![second.code.clone(), first.code.clone()]);

    for reaction in [
        ReactionType::Confused,
        ReactionType::Surprised,
        ReactionType::Unhappy,
    ] {
        h.clock.advance(ChronoDuration::seconds(1));
        h.state
            .ingest
            .submit(&second.code, reaction, h.clock.now())
            .unwrap();
    }
    let replay: Vec<_> = sessions
        .list_feedback(&second.code)
        .unwrap()
        .into_iter()
        .map(|f| f.reaction_type)
        .collect();
    assert_eq!(
        replay,
        vec![
            ReactionType::Confused,
            ReactionType::Surprised,
            ReactionType::Unhappy
        ]
    );
}
