// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Realtime speech-AI WebSocket connection.

use async_trait::async_trait;
use futures_util::stream::{self, SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::SessionConfig;
use crate::error::{RelayError, Result};
use crate::protocol::RealtimeCommand;
use crate::transport::{Outbox, OutboxReceiver, Outgoing, RealtimeLink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Opens the realtime leg of a media session.
///
/// A returned link has completed its transport handshake; the session sends
/// its configuration event itself.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(&self, config: &SessionConfig) -> Result<RealtimeLink>;
}

/// Connects to the OpenAI Realtime API over `tokio-tungstenite`.
#[derive(Debug, Default, Clone)]
pub struct OpenAIRealtimeConnector;

impl OpenAIRealtimeConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RealtimeConnector for OpenAIRealtimeConnector {
    async fn connect(&self, config: &SessionConfig) -> Result<RealtimeLink> {
        let url = config.endpoint();
        tracing::debug!("Realtime: connecting to {}", url);

        let mut request = url
            .into_client_request()
            .map_err(|e| RelayError::Handshake(format!("invalid request: {e}")))?;
        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|e| RelayError::Handshake(format!("invalid API key header: {e}")))?,
        );
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let ws_stream = match tokio::time::timeout(config.connect_timeout, connect_async(request))
            .await
        {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => return Err(RelayError::Handshake(e.to_string())),
            Err(_) => return Err(RelayError::HandshakeTimeout(config.connect_timeout.as_secs())),
        };
        tracing::debug!("Realtime: WebSocket connection established");

        let (sink, stream) = ws_stream.split();
        let (outbox, receiver) = Outbox::channel("realtime");
        tokio::spawn(write_loop(sink, receiver));

        Ok(RealtimeLink {
            outbox,
            events: read_stream(stream),
        })
    }
}

/// Drain the outbox into the socket until closed or the socket fails.
async fn write_loop(mut sink: WsSink, mut receiver: OutboxReceiver<RealtimeCommand>) {
    while let Some(item) = receiver.recv().await {
        match item {
            Outgoing::Message(command) => {
                let text = match command.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("Realtime: failed to encode command: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::error!("Realtime: WebSocket write error: {}", e);
                    receiver.mark_closed();
                    break;
                }
            }
            Outgoing::Close => {
                if let Err(e) = sink.close().await {
                    tracing::debug!("Realtime: error closing WebSocket sink: {}", e);
                }
                break;
            }
        }
    }
    tracing::debug!("Realtime: writer loop ended");
}

/// Text messages from the socket. Ends on a close frame or after the first
/// read error, which is yielded.
fn read_stream(stream: SplitStream<WsStream>) -> crate::transport::MessageStream {
    Box::pin(stream::unfold(Some(stream), |state| async move {
        let mut stream = state?;
        loop {
            match stream.next().await? {
                Ok(Message::Text(text)) => return Some((Ok(text), Some(stream))),
                Ok(Message::Close(frame)) => {
                    tracing::debug!("Realtime: WebSocket closed by server: {:?}", frame);
                    return None;
                }
                // Pings are answered by tungstenite; the API never sends binary.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_)) => {}
                Err(e) => return Some((Err(RelayError::from(e)), None)),
            }
        }
    }))
}
