// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Mutable per-call state shared by the two relays.
//!
//! Field ownership: the clock's media timestamp and the stream/call ids are
//! written by the inbound relay; the response anchor, the current item and
//! the transcript by the outbound relay and the interruption handler. The
//! marker queue is pushed by the outbound relay and popped by the inbound
//! one. Every access goes through the session's single mutex.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::session::clock::ClockTracker;
use crate::session::markers::MarkerQueue;
use crate::transcript::{CorrelationKeys, Speaker, Transcript, TranscriptEntry};

pub type SharedState = Arc<Mutex<RelayState>>;

#[derive(Debug, Default)]
pub struct RelayState {
    /// Assigned by the telephony `start` frame.
    pub stream_id: Option<String>,
    pub call_id: Option<String>,
    pub clock: ClockTracker,
    pub markers: MarkerQueue,
    /// The assistant item currently being played to the caller.
    pub current_item_id: Option<String>,
    pub transcript: Transcript,
    /// Call whose stored transcript has been merged into `transcript`.
    history_call_id: Option<String>,
}

impl RelayState {
    pub fn new(call_id: Option<String>) -> Self {
        Self {
            call_id,
            ..Self::default()
        }
    }

    pub fn shared(call_id: Option<String>) -> SharedState {
        Arc::new(Mutex::new(Self::new(call_id)))
    }

    /// A new stream started: take its ids and drop interruption state left
    /// over from any previous leg.
    pub fn begin_stream(&mut self, stream_id: String, call_id: Option<String>) {
        self.stream_id = Some(stream_id);
        if let Some(call_id) = call_id {
            self.call_id = Some(call_id);
        }
        self.clock.reset();
        self.current_item_id = None;
    }

    /// Whether the stored transcript of `call_id` still has to be loaded.
    pub fn needs_history(&self, call_id: &str) -> bool {
        self.history_call_id.as_deref() != Some(call_id)
    }

    /// Put the stored transcript of `call_id` ahead of this session's entries.
    pub fn resume_history(&mut self, call_id: &str, history: Vec<TranscriptEntry>) {
        if !self.needs_history(call_id) {
            return;
        }
        self.transcript.prepend(history);
        self.history_call_id = Some(call_id.to_string());
    }

    /// Keys for persisting the transcript, once the call id is known.
    pub fn correlation_keys(&self) -> Option<CorrelationKeys> {
        Some(CorrelationKeys {
            call_id: self.call_id.clone()?,
            stream_id: self.stream_id.clone(),
        })
    }

    /// Append to the transcript and return the snapshot to flush.
    /// `None` when the text is blank.
    pub fn record(&mut self, speaker: Speaker, text: &str) -> Option<Vec<TranscriptEntry>> {
        let entry = self.transcript.append(speaker, text)?;
        tracing::info!("{}", entry.line());
        Some(self.transcript.entries().to_vec())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            stream_id: self.stream_id.clone(),
            call_id: self.call_id.clone(),
            latest_media_timestamp_ms: self.clock.latest_media_timestamp_ms(),
            response_start_timestamp_ms: self.clock.response_start_timestamp_ms(),
            current_item_id: self.current_item_id.clone(),
            pending_marks: self.markers.len(),
            transcript: self.transcript.entries().to_vec(),
        }
    }
}

/// Point-in-time copy of a session's state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub stream_id: Option<String>,
    pub call_id: Option<String>,
    pub latest_media_timestamp_ms: u64,
    pub response_start_timestamp_ms: Option<u64>,
    pub current_item_id: Option<String>,
    pub pending_marks: usize,
    pub transcript: Vec<TranscriptEntry>,
}
