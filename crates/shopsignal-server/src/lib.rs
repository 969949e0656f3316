//! Forwarder service (Axum).
//!
//! Plays the privileged background process: accepts page-side messages,
//! queues ingest payloads, relays capture records to the event-log endpoint,
//! and exposes the queue for inspection. Also serves the event-log endpoint
//! itself, writing each record to a file.

pub mod error;
pub mod event_logs;
pub mod routes;
pub mod state;

use axum::Router;
use state::AppState;

/// Build the application router with a custom state.
pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::message_routes())
        .merge(routes::event_log_routes())
        .merge(routes::queue_routes())
        .with_state(state)
}
