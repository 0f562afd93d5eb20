//! InkCalc · handwritten math backend
//!
//! - Axum HTTP + WebSocket API; one drawing session per WebSocket
//! - Server-side raster surface, submitted as PNG to a recognition service
//! - Static SPA fallback (STATIC_DIR/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   RECOGNIZER_URL      : recognition endpoint (default "http://localhost:8900/calculate")
//!   INKCALC_CONFIG_PATH : path to TOML config (surface, layout, submission)
//!   STATIC_DIR          : front-end bundle directory (default "./static")
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod config;
mod surface;
mod vars;
mod overlay;
mod markup;
mod recognizer;
mod pipeline;
mod session;
mod state;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: config + recognition client. Sessions are per connection.
  let state = Arc::new(AppState::from_env()?);
  let addr = SocketAddr::from(([0, 0, 0, 0], state.env.port));

  let app = build_router(state);

  let listener = TcpListener::bind(addr).await?;
  info!(target: "inkcalc_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
