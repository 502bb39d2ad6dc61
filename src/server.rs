// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! HTTP entry points.
//!
//! ```text
//! GET  /                <-- health check
//! GET|POST /incoming-call  <-- Twilio fetches TwiML for a new call
//! GET  /media-stream    <-- Twilio opens the media WebSocket (one MediaSession each)
//! ```

use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::call_control::{CallControl, TwilioCallControl};
use crate::config::{RelayConfig, SessionConfig};
use crate::error::Result;
use crate::session::MediaSession;
use crate::transcript::{InMemoryTranscriptStore, RestTranscriptStore, TranscriptStore};
use crate::transport::{telephony, OpenAIRealtimeConnector, RealtimeConnector};

const CONNECTING_MESSAGE: &str = "Please wait while we connect your call.";

/// Shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionConfig>,
    pub store: Arc<dyn TranscriptStore>,
    pub call_control: Option<Arc<dyn CallControl>>,
    pub connector: Arc<dyn RealtimeConnector>,
}

impl AppState {
    /// Wire up the production collaborators described by `config`.
    ///
    /// Without a transcript store configured, transcripts are kept in memory.
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let store: Arc<dyn TranscriptStore> = match &config.store {
            Some(store) => Arc::new(RestTranscriptStore::new(store.clone())?),
            None => {
                tracing::warn!("No transcript store configured, keeping transcripts in memory");
                Arc::new(InMemoryTranscriptStore::new())
            }
        };
        let call_control = match &config.twilio {
            Some(creds) => {
                Some(Arc::new(TwilioCallControl::new(creds.clone())?) as Arc<dyn CallControl>)
            }
            None => None,
        };

        Ok(Self {
            session: Arc::new(config.session.clone()),
            store,
            call_control,
            connector: Arc::new(OpenAIRealtimeConnector::new()),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/incoming-call", get(incoming_call).post(incoming_call))
        .route("/media-stream", get(media_stream))
        .with_state(state)
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({"message": "Media stream relay is running"}))
}

/// Answer the call and connect it to `/media-stream` on the host Twilio used.
async fn incoming_call(headers: HeaderMap) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(hostname)
        .unwrap_or("localhost");
    tracing::info!(host, "Incoming call");

    (
        [(header::CONTENT_TYPE, "application/xml")],
        twiml(host, CONNECTING_MESSAGE),
    )
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
struct MediaStreamParams {
    call_id: Option<String>,
}

async fn media_stream(
    ws: WebSocketUpgrade,
    Query(params): Query<MediaStreamParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_session(socket, state, params.call_id))
}

async fn run_session(socket: WebSocket, state: AppState, call_id: Option<String>) {
    tracing::info!("Telephony WebSocket connected");
    let (link, writer) = telephony::attach(socket);

    let mut session = MediaSession::new((*state.session).clone(), state.store.clone());
    if let Some(call_id) = call_id {
        session = session.with_call_id(call_id);
    }
    if let Some(control) = &state.call_control {
        session = session.with_call_control(control.clone());
    }

    match session.run(link, state.connector.as_ref()).await {
        Ok(summary) => tracing::info!(
            call_id = ?summary.call_id,
            stream_id = ?summary.stream_id,
            entries = summary.transcript.len(),
            "Media session finished"
        ),
        Err(e) => tracing::error!("Media session failed: {}", e),
    }

    if let Err(e) = writer.await {
        tracing::warn!("Telephony writer task failed: {}", e);
    }
}

/// `Host` header without the port.
fn hostname(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

fn twiml(host: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say>{message}</Say>
  <Connect>
    <Stream url="wss://{host}/media-stream"/>
  </Connect>
</Response>"#,
        message = xml_escape(message),
        host = xml_escape(host),
    )
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
