//! Router assembly and server startup.

use std::{sync::Arc, time::Duration};

use {
    axum::{
        Json, Router,
        extract::{State, WebSocketUpgrade},
        response::Response,
        routing::{get, post},
    },
    tower_http::cors::{Any, CorsLayer},
    tracing::info,
};

use {
    convoy_auth::{ChannelDirectory, TicketIssuer},
    convoy_channels::SenderRegistry,
    convoy_config::ConvoyConfig,
    convoy_queue::{QueueManager, WorkerPool},
};

use crate::{
    auth_routes, dispatch::MessageDispatcher, jobs, queue_routes,
    services::{AgentService, EmbeddingService},
    state::{GatewayState, SessionSettings},
    ws::handle_socket,
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
    pub workers: Arc<WorkerPool>,
}

// ── Runtime assembly ─────────────────────────────────────────────────────────

/// Everything the server needs, built from config plus the pluggable
/// collaborators (shared between production startup and tests).
pub async fn build_runtime(
    config: &ConvoyConfig,
    agent: Arc<dyn AgentService>,
    embedding: Arc<dyn EmbeddingService>,
    senders: Arc<SenderRegistry>,
) -> anyhow::Result<AppState> {
    let directory = Arc::new(ChannelDirectory::from_config(&config.channels));
    let tickets = Arc::new(TicketIssuer::new(
        Arc::clone(&directory),
        Duration::from_secs(config.auth.ticket_ttl_secs),
    ));
    let queue = QueueManager::from_config(&config.queue);
    let settings = SessionSettings::from(&config.session);

    let dispatcher = Arc::new(MessageDispatcher::new(
        agent,
        Arc::clone(&queue),
        Arc::clone(&directory),
        settings.dedupe_window,
    ));

    let workers = Arc::new(WorkerPool::new(Arc::clone(&queue)));
    jobs::register_default_handlers(
        &workers,
        &config.queue,
        Arc::clone(&dispatcher),
        senders,
        embedding,
    )
    .await?;

    let gateway = GatewayState::new(directory, tickets, queue, dispatcher, settings);
    Ok(AppState { gateway, workers })
}

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_upgrade_handler))
        .route("/auth", post(auth_routes::issue_ticket))
        .route("/api/queues", get(queue_routes::queue_stats))
        .route("/api/queues/reset", post(queue_routes::reset_statistics))
        .layer(cors)
        .with_state(app_state)
}

/// Start the gateway HTTP + WebSocket server and block until shutdown.
pub async fn start_gateway(
    config: ConvoyConfig,
    agent: Arc<dyn AgentService>,
    embedding: Arc<dyn EmbeddingService>,
    senders: Arc<SenderRegistry>,
) -> anyhow::Result<()> {
    let app_state = build_runtime(&config, agent, embedding, senders).await?;

    // Background sweep of expired auth tickets.
    let sweep_tickets = Arc::clone(&app_state.gateway.tickets);
    let sweep_interval = Duration::from_secs(config.auth.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            sweep_tickets.sweep().await;
        }
    });

    let addr = format!("{}:{}", config.gateway.bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".into());
    info!(
        addr = %addr,
        host = %host,
        channels = app_state.gateway.directory.ids().len(),
        queues = app_state.gateway.queue.queue_names().len(),
        "gateway listening"
    );

    let workers = Arc::clone(&app_state.workers);
    axum::serve(listener, build_gateway_app(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    workers.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": app.gateway.version,
        "sessions": app.gateway.session_count().await,
    }))
}

async fn ws_upgrade_handler(State(app): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app.gateway))
}
