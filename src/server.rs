//! HTTP capture endpoint.
//!
//! Every path and method is accepted. `POST` requests are captured by the
//! [`capture_layer`] middleware; all requests, captured or not, get the same
//! acknowledgement from the catch-all handler:
//!
//! ```json
//! { "message": "Request recorded" }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based scanner
//! pages can post directly to the listener.

use anyhow::Result;
use axum::{extract::State, middleware, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use scancatch_core::store::RequestStore;

use crate::capture::{capture_layer, Capture};
use crate::config::Config;
use crate::db;
use crate::delivery::{Deliverer, DeliveryOutcome};
use crate::feed::{self, FeedEvent, LiveFeed, UiLoop};
use crate::listener::ListenerManager;
use crate::sqlite_store::SqliteStore;

const UI_TICK: Duration = Duration::from_millis(50);

/// JSON body of every response.
#[derive(Serialize)]
struct AckResponse {
    message: Arc<str>,
}

/// Build the capture router.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so
/// captured records carry the client address.
pub fn router(capture: Arc<Capture>, ack_message: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .fallback(handle_ack)
        .with_state(Arc::<str>::from(ack_message))
        .layer(middleware::from_fn_with_state(capture, capture_layer))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn handle_ack(State(message): State<Arc<str>>) -> Json<AckResponse> {
    Json(AckResponse { message })
}

/// Run the listener with a live feed until Ctrl-C.
///
/// This is the entry point of `scancatch serve`. The feed is seeded from the
/// store, new captures are printed as they arrive, and typing a capture id
/// on stdin copies its body to the clipboard.
pub async fn run_server(config: &Config, port: Option<u16>) -> Result<()> {
    let pool = db::open(config).await?;
    let store: Arc<dyn RequestStore> = Arc::new(SqliteStore::new(pool.clone()));

    let (sink, inbox) = feed::mailbox(config.feed.mailbox);
    let mut ui = UiLoop::new(LiveFeed::new(config.feed.capacity), inbox);
    let seeded = ui.seed_from(&store, config.feed.seed).await?;
    tracing::info!(seeded, "live feed loaded from history");
    tokio::spawn(print_events(ui.feed().subscribe()));

    let deliverer = Deliverer::from_config(&config.delivery, store.clone());
    let capture = Arc::new(Capture::new(store, Arc::new(sink)));
    let manager = ListenerManager::new(router(capture, &config.server.ack_message));

    let port = port.unwrap_or(config.server.port);
    let url = manager.start(&port.to_string()).await?;
    println!("Listening on {}", url);
    println!("Type a capture id and press Enter to copy it. Ctrl-C stops the listener.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut tick = tokio::time::interval(UI_TICK);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tick.tick() => {
                ui.drain();
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => copy_from_feed(&mut ui, &deliverer, line.trim()).await,
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin closed");
                    stdin_open = false;
                }
            },
        }
    }

    println!("Stopping listener...");
    manager.stop().await?;
    ui.drain();
    pool.close().await;
    Ok(())
}

async fn copy_from_feed(ui: &mut UiLoop, deliverer: &Deliverer, input: &str) {
    if input.is_empty() {
        return;
    }
    let Ok(id) = input.parse::<i64>() else {
        println!("Not a capture id: {}", input);
        return;
    };
    // Pick up anything captured since the last tick first.
    ui.drain();
    match ui.copy(id, deliverer).await {
        Ok(DeliveryOutcome::Copied { strategy }) => {
            println!("Copied #{} (via {}).", id, strategy);
        }
        Ok(DeliveryOutcome::ManualFallback { artifact, cause }) => {
            println!(
                "Clipboard unavailable ({}); opened {} for manual copy.",
                cause,
                artifact.display()
            );
        }
        Err(e) => println!("Copy failed: {}", e),
    }
}

async fn print_events(mut events: broadcast::Receiver<FeedEvent>) {
    loop {
        match events.recv().await {
            Ok(FeedEvent::Added(r)) => println!(
                "[{}] #{} {} {} from {}: {}",
                r.timestamp.format("%H:%M:%S"),
                r.id,
                r.method,
                r.path,
                r.client_ip,
                r.body.lines().next().unwrap_or("")
            ),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "feed printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
