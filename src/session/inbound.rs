// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Telephony -> realtime relay.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::audio::codec::Transcoder;
use crate::error::Result;
use crate::protocol::twilio::MediaPayload;
use crate::protocol::{RealtimeCommand, TelephonyFrame};
use crate::session::state::SharedState;
use crate::session::Flow;
use crate::transcript::{load_history, TranscriptEntry, TranscriptStore};
use crate::transport::{MessageStream, Outbox};
use crate::utils::helpers::{decode_base64, encode_base64};

/// Consumes telephony frames: tracks media time, forwards caller audio and
/// acknowledges playback markers.
pub struct InboundRelay {
    state: SharedState,
    realtime: Outbox<RealtimeCommand>,
    transcoder: Transcoder,
    history: Option<Arc<dyn TranscriptStore>>,
}

impl InboundRelay {
    pub fn new(state: SharedState, realtime: Outbox<RealtimeCommand>, transcoder: Transcoder) -> Self {
        Self {
            state,
            realtime,
            transcoder,
            history: None,
        }
    }

    /// Builder method: on `start`, resume the call's stored transcript.
    pub fn with_history(mut self, store: Arc<dyn TranscriptStore>) -> Self {
        self.history = Some(store);
        self
    }

    /// Run until `stop`, socket closure or cancellation. The realtime
    /// outbox is always closed on exit.
    pub async fn run(&self, mut frames: MessageStream, cancel: CancellationToken) {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = frames.next() => next,
            };

            let text = match next {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    tracing::error!("Telephony socket error: {}", e);
                    break;
                }
                None => {
                    tracing::info!("Telephony socket closed");
                    break;
                }
            };

            let frame = match TelephonyFrame::parse(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("Skipping malformed telephony frame: {}", e);
                    continue;
                }
            };

            tracing::trace!(event = frame.name(), "Telephony frame");
            let flow = tokio::select! {
                _ = cancel.cancelled() => break,
                flow = self.handle(frame) => flow,
            };
            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) if e.is_malformed() => {
                    tracing::warn!("Skipping telephony frame: {}", e);
                }
                Err(e) => {
                    tracing::error!("Inbound relay failed: {}", e);
                    break;
                }
            }
        }

        self.realtime.close();
        tracing::debug!("Inbound relay ended");
    }

    /// Apply one telephony frame.
    pub async fn handle(&self, frame: TelephonyFrame) -> Result<Flow> {
        match frame {
            TelephonyFrame::Connected { protocol } => {
                tracing::debug!(?protocol, "Telephony stream connected");
            }
            TelephonyFrame::Start { start } => {
                let call_id = match &start.call_sid {
                    Some(call_id) => Some(call_id.clone()),
                    None => self.state.lock().await.call_id.clone(),
                };
                let history = match (&self.history, call_id) {
                    (Some(store), Some(call_id)) => {
                        self.stored_history(store.as_ref(), call_id).await
                    }
                    _ => None,
                };

                // The call id is published only together with its stored transcript.
                let mut state = self.state.lock().await;
                state.begin_stream(start.stream_sid, start.call_sid);
                if let Some((entries, call_id)) = history {
                    state.resume_history(&call_id, entries);
                }
                tracing::info!(
                    stream_id = ?state.stream_id,
                    call_id = ?state.call_id,
                    "Incoming stream started"
                );
            }
            TelephonyFrame::Media { media } => self.forward_media(media).await?,
            TelephonyFrame::Mark { mark } => {
                let mut state = self.state.lock().await;
                if state.markers.acknowledge().is_some() {
                    tracing::trace!(name = %mark.name, pending = state.markers.len(), "Playback mark acknowledged");
                } else {
                    tracing::debug!(name = %mark.name, "Mark with no pending marker");
                }
            }
            TelephonyFrame::Stop { .. } => {
                tracing::info!("Telephony stream stopped");
                self.realtime.close();
                return Ok(Flow::Stop);
            }
            TelephonyFrame::Dtmf { dtmf } => {
                tracing::info!(digit = %dtmf.digit, "DTMF received");
            }
        }
        Ok(Flow::Continue)
    }

    async fn stored_history(
        &self,
        store: &dyn TranscriptStore,
        call_id: String,
    ) -> Option<(Vec<TranscriptEntry>, String)> {
        let needed = self.state.lock().await.needs_history(&call_id);
        if !needed {
            return None;
        }
        Some((load_history(store, &call_id).await, call_id))
    }

    async fn forward_media(&self, media: MediaPayload) -> Result<()> {
        if let Some(timestamp) = media.timestamp {
            self.state.lock().await.clock.observe(timestamp);
        }

        if !self.realtime.is_open() {
            tracing::trace!(socket = self.realtime.name(), "Dropping caller audio, socket closed");
            return Ok(());
        }

        let audio = self.transcoder.to_realtime(&decode_base64(&media.payload)?);
        // The realtime side may close between the check and the send.
        let _ = self.realtime.send(RealtimeCommand::append(encode_base64(&audio)));
        Ok(())
    }
}
