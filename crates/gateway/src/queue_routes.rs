//! Read-only queue observability endpoints for the operator dashboard.

use axum::{Json, extract::State};

use crate::{server::AppState, state::now_ms};

/// `GET /api/queues` — per-queue counts plus worker attachment health.
pub async fn queue_stats(State(app): State<AppState>) -> Json<serde_json::Value> {
    let stats = app.gateway.queue.stats_all().await;
    let handled = app.workers.handled_queues().await;

    let mut queues = serde_json::Map::new();
    for name in app.gateway.queue.queue_names() {
        queues.insert(
            name.clone(),
            serde_json::Value::Bool(handled.contains(&name)),
        );
    }
    let healthy = queues.values().all(|v| v.as_bool().unwrap_or(false));

    Json(serde_json::json!({
        "healthy": healthy,
        "queues": queues,
        "stats": stats,
        "timestamp": now_ms(),
    }))
}

/// `POST /api/queues/reset` — purge completed/failed jobs everywhere.
/// In-flight jobs are untouched.
pub async fn reset_statistics(State(app): State<AppState>) -> Json<serde_json::Value> {
    let cleared = app.gateway.queue.reset_statistics().await;
    Json(serde_json::json!({
        "reset": true,
        "cleared": cleared,
        "timestamp": now_ms(),
    }))
}
