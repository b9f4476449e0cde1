//! REST API flows against a live listener

use chrono::Duration as ChronoDuration;
use reqwest::StatusCode;
use serde_json::{json, Value};

use classpulse::{Clock, ReactionType, Session};

use crate::common::{start_http, Harness};

async fn create(client: &reqwest::Client, base: &str, body: Value) -> Session {
    let resp = client
        .post(format!("{}/api/sessions", base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn test_login_mints_identity() {
    let h = Harness::new();
    let base = start_http(h.state.clone()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/auth/login", base))
        .json(&json!({ "username": "ada", "role": "professor" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let identity: Value = resp.json().await.unwrap();
    assert_eq!(identity["username"], "ada");
    assert_eq!(identity["role"], "professor");
    assert!(identity["id"].as_str().is_some());

    let resp = client
        .post(format!("{}/api/auth/login", base))
        .json(&json!({ "username": "ada" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Missing fields");
}

#[tokio::test]
async fn test_create_get_end_round() {
    let h = Harness::new();
    let base = start_http(h.state.clone()).await;
    let client = reqwest::Client::new();

    let session = create(
        &client,
        &base,
        json!({
            "ownerId": "prof-1",
            "name": "Lecture 1",
            "description": "Limits",
            "durationMinutes": "1"
        }),
    )
    .await;
    assert!(session.is_active);
    assert_eq!(session.code.len(), 6);
    assert_eq!(session.duration_minutes, Some(1));

    let fetched: Session = client
        .get(format!("{}/api/sessions/{}", base, session.code.to_lowercase()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched, session);

    let resp = client
        .put(format!("{}/api/sessions/{}/end", base, session.code))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack, json!({ "success": true }));

    let fetched: Value = client
        .get(format!("{}/api/sessions/{}", base, session.code))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["isActive"], false);
}

#[tokio::test]
async fn test_create_validation_and_not_found() {
    let h = Harness::new();
    let base = start_http(h.state.clone()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/sessions", base))
        .json(&json!({ "ownerId": "prof-1", "name": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .get(format!("{}/api/sessions/NOPE00", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = client
        .put(format!("{}/api/sessions/NOPE00/end", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_applies_lazy_expiry() {
    let h = Harness::new();
    let base = start_http(h.state.clone()).await;
    let client = reqwest::Client::new();

    let session = create(
        &client,
        &base,
        json!({ "professorId": "prof-1", "name": "Quiz", "durationMinutes": 1 }),
    )
    .await;
    h.state.sessions.scheduler().cancel(&session.code);
    h.clock.advance(ChronoDuration::minutes(2));

    let fetched: Session = client
        .get(format!("{}/api/sessions/{}", base, session.code))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!fetched.is_active);
}

#[tokio::test]
async fn test_owner_history_and_feedback_listing() {
    let h = Harness::new();
    let base = start_http(h.state.clone()).await;
    let client = reqwest::Client::new();

    let older = create(&client, &base, json!({ "ownerId": "prof-1", "name": "Week 1" })).await;
    h.clock.advance(ChronoDuration::days(7));
    let newer = create(&client, &base, json!({ "ownerId": "prof-1", "name": "Week 2" })).await;

    let history: Vec<Session> = client
        .get(format!("{}/api/owners/prof-1/sessions", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let codes: Vec<_> = history.into_iter().map(|s| s.code).collect();
    assert_eq!(codes, vec![newer.code.clone(), older.code.clone()]);

    for reaction in [ReactionType::Unhappy, ReactionType::Happy] {
        h.clock.advance(ChronoDuration::seconds(5));
        h.state
            .ingest
            .submit(&newer.code, reaction, h.clock.now())
            .unwrap();
    }

    let feedback: Vec<Value> = client
        .get(format!("{}/api/sessions/{}/feedback", base, newer.code))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(feedback.len(), 2);
    assert_eq!(feedback[0]["reactionType"], "unhappy");
    assert_eq!(feedback[1]["reactionType"], "happy");
    assert_eq!(feedback[0]["sessionCode"], newer.code.as_str());
}

#[tokio::test]
async fn test_malformed_bodies_are_bad_requests() {
    let h = Harness::new();
    let base = start_http(h.state.clone()).await;
    let client = reqwest::Client::new();

    let bodies = [
        ("/api/sessions", json!({ "ownerId": "prof-1", "name": "L", "durationMinutes": 1.5 })),
        ("/api/sessions", json!({ "ownerId": "prof-1", "name": "L", "durationMinutes": true })),
        ("/api/sessions", json!({ "ownerId": "prof-1", "name": 5 })),
        ("/api/auth/login", json!({ "username": 5, "role": "student" })),
    ];
    for (path, body) in bodies {
        let resp = client
            .post(format!("{}{}", base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body {}", body);
        let error: Value = resp.json().await.unwrap();
        assert!(error["error"].as_str().is_some(), "body {}", body);
    }

    let resp = client
        .post(format!("{}/api/sessions", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let history = h.state.sessions.list_by_owner("prof-1").unwrap();
    assert!(history.is_empty());
}
