//! Socratic Tutor · Backend
//!
//! - Axum HTTP + WebSocket API for PDF-grounded Socratic tutoring sessions
//! - Adaptive dialogue controller with a pluggable tutor oracle
//! - OpenAI oracle when OPENAI_API_KEY is set, offline heuristic oracle otherwise
//!
//! Important env variables:
//!   PORT                     : u16 (default 3000)
//!   OPENAI_API_KEY           : enables OpenAI integration if present
//!   OPENAI_BASE_URL          : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL        : default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL      : default "gpt-4o"
//!   JWT_SECRET               : access token secret
//!   JWT_REFRESH_SECRET       : refresh token secret
//!   ACCESS_TOKEN_TTL_MINUTES : default 15
//!   REFRESH_TOKEN_TTL_DAYS   : default 7
//!   BCRYPT_COST              : default bcrypt::DEFAULT_COST
//!   MAX_UPLOAD_BYTES         : default 20 MiB
//!   ADVANCE_PAUSE_MS         : pause before the next question on sockets (default 1500)
//!   TUTOR_CONFIG_PATH        : path to TOML prompt overrides
//!   LOG_LEVEL                : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT               : "pretty" (default) or "json"

mod auth;
mod config;
mod dialogue;
mod difficulty;
mod domain;
mod error;
mod local;
mod logic;
mod normalize;
mod openai;
mod oracle;
mod progress;
mod protocol;
mod routes;
mod session;
mod state;
mod store;
mod telemetry;
mod util;

#[cfg(test)]
mod testing;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::AppConfig;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = AppConfig::from_env();
  let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

  // Shared application state (store, oracle, token issuer, live sessions).
  let state = Arc::new(AppState::new(config));

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  let listener = TcpListener::bind(addr).await?;
  info!(target: "socratic_tutor", %addr, oracle = state.oracle.name(), "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "socratic_tutor", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "socratic_tutor", "Shutdown signal received");
}
