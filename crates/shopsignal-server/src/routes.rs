use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shopsignal_core::messages::{BackgroundMessage, BackgroundReply, BridgeMessage};
use shopsignal_core::ShopError;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::event_logs::{EventLogPayload, FILES_PREFIX};
use crate::state::AppState;

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub fn message_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/messages", post(handle_message))
        .route("/api/v1/bridge", post(handle_bridge))
}

pub fn event_log_routes() -> Router<AppState> {
    Router::new()
        .route("/api/event-log", post(save_event_log))
        .route("/api/event-log/list", get(list_event_logs))
        .route(&format!("{FILES_PREFIX}/{{name}}"), get(read_event_log))
}

pub fn queue_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/queue", get(queue_status))
        .route("/api/v1/queue/dead-letters", delete(purge_dead_letters))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "queue_len": state.queue.len().await,
        "degraded": state.queue.is_degraded(),
    }))
}

async fn handle_message(
    State(state): State<AppState>,
    body: Result<Json<BackgroundMessage>, JsonRejection>,
) -> Result<Json<BackgroundReply>, ApiError> {
    let Json(message) = body?;
    let reply = match message {
        BackgroundMessage::QueueIngest { payload } => {
            state.queue.enqueue(payload).await;
            BackgroundReply::queued()
        }
        BackgroundMessage::SaveEventLog { payload } => {
            BackgroundReply::ack(state.event_log.save(&payload).await)
        }
        BackgroundMessage::Ping => BackgroundReply::pong(now_ms()),
    };
    Ok(Json(reply))
}

async fn handle_bridge(
    State(state): State<AppState>,
    body: Result<Json<BridgeMessage>, JsonRejection>,
) -> Result<Json<BridgeMessage>, ApiError> {
    let Json(message) = body?;
    let reply = match message {
        BridgeMessage::Ping => BridgeMessage::Pong { timestamp: now_ms() },
        BridgeMessage::QueueIngest { payload } => {
            state.queue.enqueue(payload).await;
            BridgeMessage::queued_ok()
        }
        BridgeMessage::SaveEventLog { payload } => {
            if state.event_log.save(&payload).await {
                BridgeMessage::queued_ok()
            } else {
                BridgeMessage::queued_err("event log not saved")
            }
        }
        BridgeMessage::Pong { .. } | BridgeMessage::Queued { .. } => {
            return Err(ApiError::bad_request("reply kinds are not accepted"));
        }
    };
    Ok(Json(reply))
}

async fn queue_status(State(state): State<AppState>) -> Json<Value> {
    let items = state.queue.items().await;
    let max = state.queue.max_retries();
    let dead_letters = items.iter().filter(|item| item.is_parked(max)).count();
    Json(json!({
        "len": items.len(),
        "dead_letters": dead_letters,
        "degraded": state.queue.is_degraded(),
        "items": items,
    }))
}

async fn purge_dead_letters(State(state): State<AppState>) -> Json<Value> {
    let purged = state.queue.purge_dead_letters().await;
    debug!(purged, "dead letters purged via api");
    Json(json!({ "purged": purged }))
}

async fn save_event_log(
    State(state): State<AppState>,
    body: Result<Json<EventLogPayload>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = body?;
    let saved = state.event_logs.save(&payload).await.map_err(|e| {
        warn!(error = %e, "failed to write event log");
        ApiError::from(ShopError::from(e))
    })?;
    info!(file = %saved.filename, "event log stored");
    Ok(Json(json!({ "ok": true, "file": saved.file, "filename": saved.filename })))
}

async fn list_event_logs(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let files = state
        .event_logs
        .list()
        .await
        .map_err(|e| ApiError::from(ShopError::from(e)))?;
    Ok(Json(json!({ "ok": true, "files": files })))
}

async fn read_event_log(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.event_logs.read(&name).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(ApiError::not_found(format!("no event log named {name}"))),
        Err(e) => Err(ApiError::from(ShopError::from(e))),
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
