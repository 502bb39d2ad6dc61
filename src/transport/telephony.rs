// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Telephony leg over an accepted axum WebSocket.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{self, SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;

use crate::error::RelayError;
use crate::protocol::TelephonyCommand;
use crate::transport::{MessageStream, Outbox, OutboxReceiver, Outgoing, TelephonyLink};

/// Split an accepted media-stream socket into a [`TelephonyLink`].
///
/// The returned handle is the writer task; it finishes after the outbox is
/// closed and the close frame is sent.
pub fn attach(socket: WebSocket) -> (TelephonyLink, JoinHandle<()>) {
    let (sink, stream) = socket.split();
    let (outbox, receiver) = Outbox::channel("telephony");
    let writer = tokio::spawn(write_loop(sink, receiver));
    (
        TelephonyLink {
            outbox,
            frames: read_stream(stream),
        },
        writer,
    )
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut receiver: OutboxReceiver<TelephonyCommand>,
) {
    while let Some(item) = receiver.recv().await {
        match item {
            Outgoing::Message(command) => {
                let text = match command.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("Telephony: failed to encode frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!("Telephony: WebSocket write error: {}", e);
                    receiver.mark_closed();
                    break;
                }
            }
            Outgoing::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
    tracing::debug!("Telephony: writer loop ended");
}

fn read_stream(stream: SplitStream<WebSocket>) -> MessageStream {
    Box::pin(stream::unfold(Some(stream), |state| async move {
        let mut stream = state?;
        loop {
            match stream.next().await? {
                Ok(Message::Text(text)) => return Some((Ok(text), Some(stream))),
                Ok(Message::Close(frame)) => {
                    tracing::debug!("Telephony: WebSocket closed by peer: {:?}", frame);
                    return None;
                }
                Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_)) => {}
                Err(e) => return Some((Err(RelayError::from(e)), None)),
            }
        }
    }))
}
