// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Socket plumbing shared by both legs of a media session.
//!
//! Each leg is split into an [`Outbox`] (messages queued for a writer task,
//! sent in order) and a stream of inbound text messages. Relays only ever see
//! these two halves, which keeps them independent of the socket library and
//! lets tests drive them through plain channels.

pub mod realtime;
pub mod telephony;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::{self, BoxStream};
use tokio::sync::mpsc;

use crate::error::{RelayError, Result};
use crate::protocol::{RealtimeCommand, TelephonyCommand};

pub use realtime::{OpenAIRealtimeConnector, RealtimeConnector};

/// Inbound text messages from one socket. The stream ends when the peer
/// closes; an `Err` item is a transport fault.
pub type MessageStream = BoxStream<'static, Result<String>>;

/// An item queued for a writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing<T> {
    Message(T),
    /// Close the socket after everything queued before it has been written.
    Close,
}

/// Ordered, closable queue of outgoing messages for one socket.
///
/// Once [`close`](Outbox::close) is called (or the writer reports the socket
/// gone) every further [`send`](Outbox::send) fails with
/// [`RelayError::SocketClosed`] without queueing anything.
#[derive(Debug)]
pub struct Outbox<T> {
    tx: mpsc::UnboundedSender<Outgoing<T>>,
    open: Arc<AtomicBool>,
    name: &'static str,
}

impl<T> Clone for Outbox<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            open: self.open.clone(),
            name: self.name,
        }
    }
}

/// Writer-task side of an [`Outbox`].
#[derive(Debug)]
pub struct OutboxReceiver<T> {
    rx: mpsc::UnboundedReceiver<Outgoing<T>>,
    open: Arc<AtomicBool>,
}

impl<T> Outbox<T> {
    /// Create a connected outbox/receiver pair. `name` labels errors and logs.
    pub fn channel(name: &'static str) -> (Self, OutboxReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        (
            Self {
                tx,
                open: open.clone(),
                name,
            },
            OutboxReceiver { rx, open },
        )
    }

    pub fn send(&self, message: T) -> Result<()> {
        if !self.is_open() {
            return Err(RelayError::SocketClosed(self.name));
        }
        self.tx.send(Outgoing::Message(message)).map_err(|_| {
            self.open.store(false, Ordering::SeqCst);
            RelayError::SocketClosed(self.name)
        })
    }

    /// Stop accepting messages and ask the writer to close the socket.
    /// Idempotent.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            tracing::debug!(socket = self.name, "Closing socket");
            let _ = self.tx.send(Outgoing::Close);
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> OutboxReceiver<T> {
    /// Next queued item. `None` once every [`Outbox`] clone is gone.
    pub async fn recv(&mut self) -> Option<Outgoing<T>> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Outgoing<T>> {
        self.rx.try_recv().ok()
    }

    /// Record that the socket can no longer be written to.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Adapt a channel of text messages into a [`MessageStream`].
pub fn channel_stream(rx: mpsc::UnboundedReceiver<Result<String>>) -> MessageStream {
    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}

/// The realtime leg once its handshake has completed.
pub struct RealtimeLink {
    pub outbox: Outbox<RealtimeCommand>,
    pub events: MessageStream,
}

/// The telephony leg as seen by a media session.
pub struct TelephonyLink {
    pub outbox: Outbox<TelephonyCommand>,
    pub frames: MessageStream,
}
