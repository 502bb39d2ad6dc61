// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Background transcript writer.
//!
//! The relay loops never await the store. They post a snapshot of the whole
//! transcript to a [`FlushHandle`]; a single task per session drains the
//! queue and writes through the [`TranscriptStore`]. When several snapshots
//! are queued only the newest is written, since each one supersedes the
//! ones before it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::transcript::{CorrelationKeys, TranscriptEntry, TranscriptStore};

/// A full transcript snapshot to persist.
#[derive(Debug, Clone)]
pub struct FlushRequest {
    pub keys: CorrelationKeys,
    pub entries: Vec<TranscriptEntry>,
}

/// Cheap, cloneable sender side of the flusher.
#[derive(Debug, Clone)]
pub struct FlushHandle {
    tx: mpsc::UnboundedSender<FlushRequest>,
}

impl FlushHandle {
    /// Queue a write. Returns `false` if the flusher has already stopped.
    pub fn request(&self, keys: CorrelationKeys, entries: Vec<TranscriptEntry>) -> bool {
        self.tx.send(FlushRequest { keys, entries }).is_ok()
    }
}

pub struct TranscriptFlusher;

impl TranscriptFlusher {
    /// Start the writer task.
    ///
    /// The task ends once every [`FlushHandle`] has been dropped and the
    /// queue is empty, so awaiting the returned handle drains pending writes.
    pub fn spawn(store: Arc<dyn TranscriptStore>) -> (FlushHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(Self::run(store, rx));
        (FlushHandle { tx }, task)
    }

    async fn run(store: Arc<dyn TranscriptStore>, mut rx: mpsc::UnboundedReceiver<FlushRequest>) {
        while let Some(mut request) = rx.recv().await {
            // Skip to the newest queued snapshot.
            while let Ok(newer) = rx.try_recv() {
                request = newer;
            }

            if let Err(e) = store
                .append_transcript(&request.keys, &request.entries)
                .await
            {
                tracing::warn!(
                    call_id = %request.keys.call_id,
                    entries = request.entries.len(),
                    "Transcript flush failed: {}",
                    e
                );
            }
        }
        tracing::debug!("Transcript flusher stopped");
    }
}
