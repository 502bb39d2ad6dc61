// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Realtime -> telephony relay.
//!
//! Forwards assistant audio to the caller, keeps the transcript, and runs the
//! interruption handler when the caller talks over the assistant. Events are
//! handled strictly one at a time, so an interruption completes before the
//! next audio delta is forwarded.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::audio::codec::Transcoder;
use crate::call_control::CallControl;
use crate::error::Result;
use crate::protocol::realtime::{EventEnvelope, ResponseBody};
use crate::protocol::twilio::RESPONSE_MARK_NAME;
use crate::protocol::{RealtimeCommand, RealtimeEvent, TelephonyCommand};
use crate::session::interruption;
use crate::session::state::SharedState;
use crate::session::Flow;
use crate::transcript::{FlushHandle, Speaker};
use crate::transport::{MessageStream, Outbox};
use crate::utils::helpers::{contains_phrase, decode_base64, encode_base64};

const END_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Ends the call when a configured phrase is spoken.
#[derive(Clone, Default)]
pub struct HangupPolicy {
    phrases: Vec<String>,
    control: Option<Arc<dyn CallControl>>,
}

impl HangupPolicy {
    pub fn new(phrases: Vec<String>, control: Option<Arc<dyn CallControl>>) -> Self {
        Self { phrases, control }
    }

    fn matching_phrase(&self, text: &str) -> Option<&str> {
        self.phrases
            .iter()
            .map(String::as_str)
            .find(|phrase| contains_phrase(text, phrase))
    }
}

pub struct OutboundRelay {
    state: SharedState,
    realtime: Outbox<RealtimeCommand>,
    telephony: Outbox<TelephonyCommand>,
    transcoder: Transcoder,
    flusher: FlushHandle,
    hangup: HangupPolicy,
}

impl OutboundRelay {
    pub fn new(
        state: SharedState,
        realtime: Outbox<RealtimeCommand>,
        telephony: Outbox<TelephonyCommand>,
        transcoder: Transcoder,
        flusher: FlushHandle,
    ) -> Self {
        Self {
            state,
            realtime,
            telephony,
            transcoder,
            flusher,
            hangup: HangupPolicy::default(),
        }
    }

    pub fn with_hangup(mut self, hangup: HangupPolicy) -> Self {
        self.hangup = hangup;
        self
    }

    /// Run until the realtime socket closes, the telephony socket fails, a
    /// hang-up phrase is heard, or cancellation.
    pub async fn run(&self, mut events: MessageStream, cancel: CancellationToken) {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = events.next() => next,
            };

            let text = match next {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    tracing::error!("Realtime socket error: {}", e);
                    break;
                }
                None => {
                    tracing::info!("Realtime socket closed");
                    break;
                }
            };

            let event = match RealtimeEvent::parse(&text) {
                Ok(RealtimeEvent::Other) => {
                    tracing::trace!(event = ?EventEnvelope::event_type_of(&text), "Ignoring realtime event");
                    continue;
                }
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Skipping malformed realtime event: {}", e);
                    continue;
                }
            };

            let flow = tokio::select! {
                _ = cancel.cancelled() => break,
                flow = self.handle(event) => flow,
            };
            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) if e.is_malformed() => {
                    tracing::warn!("Skipping realtime event: {}", e);
                }
                Err(e) => {
                    tracing::error!("Outbound relay failed: {}", e);
                    break;
                }
            }
        }
        tracing::debug!("Outbound relay ended");
    }

    /// Apply one realtime event.
    ///
    /// An `Err` from a telephony write means the caller is gone; the loop
    /// treats it as fatal.
    pub async fn handle(&self, event: RealtimeEvent) -> Result<Flow> {
        match event {
            RealtimeEvent::SessionCreated { .. } => tracing::debug!("Realtime session created"),
            RealtimeEvent::SessionUpdated { .. } => tracing::debug!("Realtime session updated"),
            RealtimeEvent::InputTranscriptionCompleted { transcript, .. } => {
                return Ok(self.record(Speaker::User, &transcript).await);
            }
            RealtimeEvent::AudioDelta { item_id, delta, .. } => {
                self.forward_audio(item_id, &delta).await?;
            }
            RealtimeEvent::ResponseDone { response } => {
                return Ok(self.record_response(&response).await);
            }
            RealtimeEvent::SpeechStarted { audio_start_ms, .. } => {
                tracing::debug!(?audio_start_ms, "Caller speech started");
                let mut state = self.state.lock().await;
                if state.current_item_id.is_some() {
                    interruption::interrupt(&mut state, &self.realtime, &self.telephony);
                }
            }
            RealtimeEvent::SpeechStopped { audio_end_ms } => {
                tracing::debug!(?audio_end_ms, "Caller speech stopped");
            }
            RealtimeEvent::Error { error } => {
                tracing::error!(
                    kind = ?error.kind,
                    code = ?error.code,
                    "Realtime error: {}",
                    error.message.as_deref().unwrap_or("unknown")
                );
            }
            RealtimeEvent::Other => {}
        }
        Ok(Flow::Continue)
    }

    async fn forward_audio(&self, item_id: Option<String>, delta: &str) -> Result<()> {
        let audio = self.transcoder.to_telephony(&decode_base64(delta)?);
        let payload = encode_base64(&audio);

        let mut state = self.state.lock().await;
        let Some(stream_id) = state.stream_id.clone() else {
            tracing::warn!("Dropping assistant audio received before stream start");
            return Ok(());
        };

        self.telephony.send(TelephonyCommand::media(stream_id.as_str(), payload))?;

        if state.clock.mark_response_start() {
            tracing::debug!(
                start_ms = state.clock.latest_media_timestamp_ms(),
                "Assistant playback started"
            );
        }
        if let Some(item_id) = item_id {
            state.current_item_id = Some(item_id);
        }

        state.markers.push(RESPONSE_MARK_NAME);
        self.telephony
            .send(TelephonyCommand::mark(stream_id, RESPONSE_MARK_NAME))?;
        Ok(())
    }

    async fn record_response(&self, response: &ResponseBody) -> Flow {
        let mut flow = Flow::Continue;
        for text in response.assistant_transcripts() {
            if self.record(Speaker::Assistant, text).await == Flow::Stop {
                flow = Flow::Stop;
            }
        }
        flow
    }

    /// Append an utterance, flush, and check for a hang-up phrase.
    async fn record(&self, speaker: Speaker, text: &str) -> Flow {
        let call_id = {
            let mut state = self.state.lock().await;
            let Some(entries) = state.record(speaker, text) else {
                return Flow::Continue;
            };
            match state.correlation_keys() {
                Some(keys) => {
                    let call_id = keys.call_id.clone();
                    if !self.flusher.request(keys, entries) {
                        tracing::warn!("Transcript flusher is gone, entry not persisted");
                    }
                    Some(call_id)
                }
                None => {
                    tracing::debug!("No call id yet, transcript flush deferred");
                    None
                }
            }
        };

        let Some(phrase) = self.hangup.matching_phrase(text) else {
            return Flow::Continue;
        };
        tracing::info!(%speaker, phrase, "Hang-up phrase detected");

        match (&self.hangup.control, call_id) {
            (Some(control), Some(call_id)) => {
                match tokio::time::timeout(END_CALL_TIMEOUT, control.end_call(&call_id)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(call_id = %call_id, "Failed to end call: {}", e),
                    Err(_) => tracing::warn!(
                        call_id = %call_id,
                        "Ending the call timed out after {}s",
                        END_CALL_TIMEOUT.as_secs()
                    ),
                }
            }
            (None, _) => tracing::debug!("No call control configured, closing stream only"),
            (_, None) => tracing::warn!("Cannot end call without a call id"),
        }
        Flow::Stop
    }
}
