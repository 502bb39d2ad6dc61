// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Media session: one phone call bridged to one realtime AI session.
//!
//! A [`MediaSession`] owns the per-call state and runs the [`InboundRelay`]
//! and [`OutboundRelay`] side by side. Its lifecycle is published on a
//! `watch` channel:
//!
//! ```text
//! Connecting --handshake ok--> Active --either side ends--> Closing --> Closed
//!     |                                                                  ^
//!     +-------------------------handshake failed-------------------------+
//! ```
//!
//! Whichever relay finishes first cancels the other, both sockets are closed,
//! the transcript is flushed one last time and the session reports `Closed`.

pub mod clock;
pub mod inbound;
pub mod interruption;
pub mod markers;
pub mod outbound;
pub mod state;

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::audio::codec::Transcoder;
use crate::call_control::CallControl;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::protocol::RealtimeCommand;
use crate::transcript::{load_history, TranscriptEntry, TranscriptFlusher, TranscriptStore};
use crate::transport::{RealtimeConnector, RealtimeLink, TelephonyLink};

pub use clock::ClockTracker;
pub use inbound::InboundRelay;
pub use markers::MarkerQueue;
pub use outbound::{HangupPolicy, OutboundRelay};
pub use state::{RelayState, SessionSnapshot, SharedState};

/// Whether a relay loop should keep going after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Telephony socket accepted, realtime handshake in progress.
    Connecting,
    /// Both relays running.
    Active,
    /// One side ended; the other is being shut down.
    Closing,
    /// Terminal.
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Read-only view of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    state: SharedState,
    phase: watch::Receiver<SessionPhase>,
}

impl SessionHandle {
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Subscribe to phase changes.
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot()
    }
}

/// What a finished session leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub call_id: Option<String>,
    pub stream_id: Option<String>,
    pub transcript: Vec<TranscriptEntry>,
}

pub struct MediaSession {
    config: SessionConfig,
    store: Arc<dyn TranscriptStore>,
    call_control: Option<Arc<dyn CallControl>>,
    state: SharedState,
    phase: watch::Sender<SessionPhase>,
}

impl MediaSession {
    pub fn new(config: SessionConfig, store: Arc<dyn TranscriptStore>) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Connecting);
        Self {
            config,
            store,
            call_control: None,
            state: RelayState::shared(None),
            phase,
        }
    }

    /// Builder method: correlate with a call record before `start` arrives.
    /// A `callSid` in the `start` frame takes precedence.
    pub fn with_call_id(self, call_id: impl Into<String>) -> Self {
        Self {
            state: RelayState::shared(Some(call_id.into())),
            ..self
        }
    }

    /// Builder method: collaborator used to end the call on a hang-up phrase.
    pub fn with_call_control(mut self, control: Arc<dyn CallControl>) -> Self {
        self.call_control = Some(control);
        self
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            state: self.state.clone(),
            phase: self.phase.subscribe(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    fn set_phase(&self, next: SessionPhase) {
        self.phase.send_if_modified(|phase| {
            if *phase == next || *phase == SessionPhase::Closed {
                return false;
            }
            tracing::info!(from = %phase, to = %next, "Media session phase");
            *phase = next;
            true
        });
    }

    /// Bridge `telephony` to a realtime session opened through `connector`
    /// and run until the call ends.
    ///
    /// A failed realtime handshake closes the telephony leg and is returned
    /// as the error; nothing is retried.
    pub async fn run(
        self,
        telephony: TelephonyLink,
        connector: &dyn RealtimeConnector,
    ) -> Result<SessionSummary> {
        let TelephonyLink {
            outbox: telephony,
            frames,
        } = telephony;
        let RealtimeLink {
            outbox: realtime,
            events,
        } = match self.open_realtime(connector).await {
            Ok(link) => link,
            Err(e) => {
                tracing::error!("Realtime session setup failed: {}", e);
                telephony.close();
                self.set_phase(SessionPhase::Closed);
                return Err(e);
            }
        };
        self.resume_preassigned_history().await;
        self.set_phase(SessionPhase::Active);

        let transcoder = Transcoder::new(self.config.audio_format);
        tracing::debug!(format = %transcoder.format(), "Relaying call audio");
        let (flush, flusher) = TranscriptFlusher::spawn(self.store.clone());
        let cancel = CancellationToken::new();

        let inbound = InboundRelay::new(self.state.clone(), realtime.clone(), transcoder)
            .with_history(self.store.clone());
        let outbound = OutboundRelay::new(
            self.state.clone(),
            realtime.clone(),
            telephony.clone(),
            transcoder,
            flush.clone(),
        )
        .with_hangup(HangupPolicy::new(
            self.config.hangup_phrases.clone(),
            self.call_control.clone(),
        ));

        tokio::join!(
            async {
                inbound.run(frames, cancel.clone()).await;
                self.set_phase(SessionPhase::Closing);
                cancel.cancel();
            },
            async {
                outbound.run(events, cancel.clone()).await;
                self.set_phase(SessionPhase::Closing);
                cancel.cancel();
            },
        );

        realtime.close();
        telephony.close();

        let summary = {
            let state = self.state.lock().await;
            if let Some(keys) = state.correlation_keys() {
                if !state.transcript.is_empty() {
                    flush.request(keys, state.transcript.entries().to_vec());
                }
            }
            SessionSummary {
                call_id: state.call_id.clone(),
                stream_id: state.stream_id.clone(),
                transcript: state.transcript.entries().to_vec(),
            }
        };

        drop(flush);
        drop(outbound);
        if let Err(e) = flusher.await {
            tracing::warn!("Transcript flusher task failed: {}", e);
        }

        self.set_phase(SessionPhase::Closed);
        Ok(summary)
    }

    /// A call id given up front is known before any relay runs, so its stored
    /// transcript is merged before anything can be flushed over it.
    async fn resume_preassigned_history(&self) {
        let Some(call_id) = self.state.lock().await.call_id.clone() else {
            return;
        };
        let history = load_history(self.store.as_ref(), &call_id).await;
        self.state.lock().await.resume_history(&call_id, history);
    }

    /// Connect and configure the realtime leg.
    async fn open_realtime(&self, connector: &dyn RealtimeConnector) -> Result<RealtimeLink> {
        let link = connector.connect(&self.config).await?;

        link.outbox.send(RealtimeCommand::SessionUpdate {
            session: self.config.session_settings(),
        })?;
        if let Some(greeting) = &self.config.greeting {
            link.outbox.send(RealtimeCommand::user_text(format!(
                "Greet the caller with '{greeting}'"
            )))?;
            link.outbox.send(RealtimeCommand::ResponseCreate)?;
        }
        tracing::debug!(voice = %self.config.voice, "Realtime session configured");
        Ok(link)
    }
}
