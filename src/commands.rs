//! Command execution for the `classpulse` binary
//!
//! `serve` runs the daemon; every other command opens the store directly and
//! renders its result as text or JSON.

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::cli::{Cli, Commands, OutputFormat};
use crate::config::DaemonConfig;
use crate::error::{PulseError, Result};
use crate::schema::{Feedback, Session};
use crate::state::AppState;
use crate::store::{SessionStore, SqliteStore};
use crate::{http, socket_server};

/// Execute one parsed command line, returning what should go to stdout
pub async fn run(cli: Cli) -> Result<String> {
    let store: Arc<dyn SessionStore> = Arc::new(SqliteStore::open_location(&cli.database)?);
    let state = AppState::with_system_clock(store);
    let format = cli.format;

    match cli.command {
        Commands::Serve(config) => {
            serve(state, config).await?;
            Ok(String::new())
        }
        Commands::Sessions { owner } => {
            let sessions = state.sessions.list_by_owner(&owner)?;
            render(format, &sessions, || {
                sessions.iter().map(session_line).collect::<Vec<_>>().join("\n")
            })
        }
        Commands::Show { code } => {
            let session = state.sessions.get(&code)?;
            render(format, &session, || session_details(&session))
        }
        Commands::End { code } => {
            let session = state.sessions.end(&code)?;
            render(format, &session, || format!("Session {} closed", session.code))
        }
        Commands::Feedback { code } => {
            let feedback = state.sessions.list_feedback(&code)?;
            render(format, &feedback, || {
                feedback.iter().map(feedback_line).collect::<Vec<_>>().join("\n")
            })
        }
    }
}

/// Run both servers until ctrl-c
pub async fn serve(state: AppState, config: DaemonConfig) -> Result<()> {
    config.validate()?;

    // Timers do not survive restarts
    let report = state.sessions.restore_timers()?;
    tracing::info!(
        "Startup reconciliation: {} timers armed, {} sessions closed",
        report.armed,
        report.closed
    );

    let ws_listener = TcpListener::bind(config.ws_addr()?).await?;
    let http_listener = TcpListener::bind(config.http_addr()?).await?;
    tracing::info!("WebSocket server listening on ws://{}", ws_listener.local_addr()?);
    tracing::info!("REST API listening on http://{}", http_listener.local_addr()?);

    tokio::spawn(socket_server::serve(ws_listener, state.clone()));

    axum::serve(http_listener, http::router(state.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    state.sessions.scheduler().shutdown();
    Ok(())
}

fn render<T: serde::Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce() -> String,
) -> Result<String> {
    let output = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map_err(|e| PulseError::Io(std::io::Error::other(e)))?,
        OutputFormat::Text => text(),
    };
    Ok(format!("{}\n", output))
}

fn session_line(session: &Session) -> String {
    format!(
        "{}  {:<6}  {}  {}",
        session.code,
        if session.is_active { "active" } else { "closed" },
        session.created_at.format("%Y-%m-%d %H:%M"),
        session.name
    )
}

fn session_details(session: &Session) -> String {
    let mut lines = vec![
        format!("code:     {}", session.code),
        format!("name:     {}", session.name),
        format!("owner:    {}", session.owner_id),
        format!("created:  {}", session.created_at.to_rfc3339()),
        format!(
            "status:   {}",
            if session.is_active { "active" } else { "closed" }
        ),
    ];
    if let Some(description) = &session.description {
        lines.push(format!("about:    {}", description));
    }
    if let Some(expiry) = session.expires_at() {
        lines.push(format!("expires:  {}", expiry.to_rfc3339()));
    }
    lines.join("\n")
}

fn feedback_line(feedback: &Feedback) -> String {
    format!(
        "{}  {}  {}",
        feedback.timestamp.format("%H:%M:%S"),
        feedback.reaction_type.glyph(),
        feedback.reaction_type
    )
}
