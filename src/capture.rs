//! Capture middleware.
//!
//! Every inbound `POST` is buffered (up to [`BODY_READ_LIMIT`] bytes),
//! normalized, persisted and announced to the [`CaptureSink`] before the
//! downstream handler runs. Other methods pass through untouched. Capture problems are logged; they never change the
//! response the client gets.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Local;
use http_body_util::BodyExt;

use scancatch_core::models::{CapturedRequest, BODY_MAX};
use scancatch_core::normalize::{build_record, RawCapture};
use scancatch_core::store::RequestStore;

use crate::feed::CaptureSink;

/// Bytes of body kept per capture: enough for `BODY_MAX` characters of
/// 4-byte UTF-8. Anything past it is read and discarded.
pub const BODY_READ_LIMIT: usize = BODY_MAX * 4;

/// Shared state of the capture middleware.
pub struct Capture {
    store: Arc<dyn RequestStore>,
    sink: Arc<dyn CaptureSink>,
}

impl Capture {
    pub fn new(store: Arc<dyn RequestStore>, sink: Arc<dyn CaptureSink>) -> Self {
        Self { store, sink }
    }

    /// Persist one request and notify the sink.
    ///
    /// Returns the stored record, or `None` if the store rejected it.
    pub async fn record(&self, raw: RawCapture<'_>) -> Option<CapturedRequest> {
        let new = build_record(raw);
        match self.store.insert(&new).await {
            Ok(id) => {
                let record = new.with_id(id);
                tracing::info!(
                    id,
                    path = %record.path,
                    client = %record.client_ip,
                    bytes = record.body.len(),
                    "captured request"
                );
                self.sink.notify(record.clone()).await;
                Some(record)
            }
            Err(e) => {
                tracing::error!(error = %e, path = %new.path, "failed to persist captured request");
                None
            }
        }
    }
}

/// `axum::middleware::from_fn_with_state` entry point.
pub async fn capture_layer(
    State(capture): State<Arc<Capture>>,
    req: Request,
    next: Next,
) -> Response {
    if !req.method().as_str().eq_ignore_ascii_case("POST") {
        return next.run(req).await;
    }

    let client_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let (parts, body) = req.into_parts();
    let bytes = match read_capped(body, BODY_READ_LIMIT).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read request body; not captured");
            return next.run(Request::from_parts(parts, Body::empty())).await;
        }
    };

    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| parts.uri.path());

    capture
        .record(RawCapture {
            method: parts.method.as_str(),
            path,
            headers: headers
                .iter()
                .map(|(n, v)| (n.as_str(), v.as_str()))
                .collect(),
            body: &bytes,
            client_ip,
            timestamp: Local::now(),
        })
        .await;

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Read the whole body but keep at most `limit` bytes of it.
async fn read_capped(mut body: Body, limit: usize) -> Result<Vec<u8>, axum::Error> {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    while let Some(frame) = body.frame().await {
        let Ok(data) = frame?.into_data() else {
            continue;
        };
        let room = limit.saturating_sub(kept.len());
        let take = room.min(data.len());
        kept.extend_from_slice(&data[..take]);
        dropped += data.len() - take;
    }
    if dropped > 0 {
        tracing::warn!(
            kept = kept.len(),
            dropped,
            "request body over capture limit, truncated"
        );
    }
    Ok(kept)
}
