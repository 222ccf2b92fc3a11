//! Gateway: HTTP + WebSocket server, session state machine, message
//! dispatch, and background-job wiring.
//!
//! Lifecycle:
//! 1. Load config, build the channel directory and ticket issuer
//! 2. Build the queue manager and register job handlers
//! 3. Start the HTTP server (ticket issuance, queue stats, health)
//! 4. Attach the WebSocket upgrade handler; each connection runs the
//!    session state machine (connect → authenticate → greet → messages)
//!
//! Agent invocation, channel runtimes, and document chunking live behind
//! the service traits in `services.rs`; the gateway only orchestrates.

pub mod auth_routes;
pub mod dispatch;
pub mod jobs;
pub mod queue_routes;
pub mod server;
pub mod services;
pub mod state;
pub mod ws;
