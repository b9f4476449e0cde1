//! REST surface for the browser client
//!
//! | Method | Path                              | Operation            |
//! |--------|-----------------------------------|----------------------|
//! | POST   | `/api/auth/login`                 | mint identity        |
//! | POST   | `/api/sessions`                   | create session       |
//! | GET    | `/api/sessions/{code}`            | get (lazy expiry)    |
//! | PUT    | `/api/sessions/{code}/end`        | end session          |
//! | GET    | `/api/sessions/{code}/feedback`   | feedback, oldest first |
//! | GET    | `/api/owners/{owner_id}/sessions` | history, newest first |

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::PulseError;
use crate::identity::{self, Identity};
use crate::schema::{Feedback, NewSession, Session};
use crate::state::AppState;

/// Build the REST router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{code}", get(get_session))
        .route("/api/sessions/{code}/end", put(end_session))
        .route("/api/sessions/{code}/feedback", get(list_feedback))
        .route("/api/owners/{owner_id}/sessions", get(list_owner_sessions))
        .with_state(state)
}

/// Error wrapper that renders as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError(PulseError);

impl From<PulseError> for ApiError {
    fn from(err: PulseError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            PulseError::Validation { message } => (StatusCode::BAD_REQUEST, message.clone()),
            PulseError::NotFound { .. } => (StatusCode::NOT_FOUND, "Session not found".to_string()),
            other => {
                tracing::error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server error".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// JSON body whose rejection is handled by the route instead of axum
type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;

/// Unwrap a JSON body, reporting shape errors as validation failures
fn json_body<T: DeserializeOwned>(payload: JsonBody<T>) -> std::result::Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        let detail = rejection.body_text();
        tracing::debug!("Rejected request body: {}", detail);
        PulseError::validation(format!("Invalid request body: {}", detail)).into()
    })
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: Option<String>,
    role: Option<String>,
}

async fn login(payload: JsonBody<LoginRequest>) -> ApiResult<Identity> {
    let body = json_body(payload)?;
    let (Some(username), Some(role)) = (body.username, body.role) else {
        return Err(PulseError::validation("Missing fields").into());
    };
    let identity = identity::login(&username, &role)?;
    tracing::info!("Login {} as {:?}", identity.username, identity.role);
    Ok(Json(identity))
}

/// `durationMinutes` arrives as a number or as the raw form string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DurationInput {
    Number(i64),
    Text(String),
}

impl DurationInput {
    fn minutes(self) -> Result<Option<u32>, PulseError> {
        let value = match self {
            Self::Number(n) => n,
            Self::Text(s) if s.trim().is_empty() => return Ok(None),
            Self::Text(s) => s.trim().parse::<i64>().map_err(|_| {
                PulseError::validation("durationMinutes must be a positive integer")
            })?,
        };
        u32::try_from(value)
            .ok()
            .filter(|m| *m > 0)
            .map(Some)
            .ok_or_else(|| PulseError::validation("durationMinutes must be a positive integer"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    #[serde(alias = "professorId")]
    owner_id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    duration_minutes: Option<DurationInput>,
}

impl CreateSessionRequest {
    fn into_new_session(self) -> Result<NewSession, PulseError> {
        let (Some(owner_id), Some(name)) = (self.owner_id, self.name) else {
            return Err(PulseError::validation("Missing fields"));
        };
        let duration_minutes = match self.duration_minutes {
            Some(input) => input.minutes()?,
            None => None,
        };
        Ok(NewSession {
            owner_id,
            name,
            description: self.description,
            duration_minutes,
        })
    }
}

async fn create_session(
    State(state): State<AppState>,
    payload: JsonBody<CreateSessionRequest>,
) -> ApiResult<Session> {
    let body = json_body(payload)?;
    let session = state.sessions.create(body.into_new_session()?)?;
    Ok(Json(session))
}

async fn get_session(State(state): State<AppState>, Path(code): Path<String>) -> ApiResult<Session> {
    Ok(Json(state.sessions.get(&code)?))
}

async fn end_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<serde_json::Value> {
    state.sessions.end(&code)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn list_feedback(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Vec<Feedback>> {
    Ok(Json(state.sessions.list_feedback(&code)?))
}

async fn list_owner_sessions(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> ApiResult<Vec<Session>> {
    Ok(Json(state.sessions.list_by_owner(&owner_id)?))
}
