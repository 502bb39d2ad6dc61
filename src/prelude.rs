// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Common re-exports for embedding the relay.
//!
//! ```
//! use callrelay::prelude::*;
//! ```

pub use std::sync::Arc;

pub use crate::call_control::{CallControl, TwilioCallControl};
pub use crate::config::{RelayConfig, SessionConfig};
pub use crate::error::{RelayError, Result};
pub use crate::protocol::{
    AudioFormat, RealtimeCommand, RealtimeEvent, TelephonyCommand, TelephonyFrame,
};
pub use crate::session::{MediaSession, SessionHandle, SessionPhase, SessionSnapshot, SessionSummary};
pub use crate::transcript::{
    CorrelationKeys, InMemoryTranscriptStore, RestTranscriptStore, Speaker, TranscriptEntry,
    TranscriptStore,
};
pub use crate::transport::{
    OpenAIRealtimeConnector, Outbox, RealtimeConnector, RealtimeLink, TelephonyLink,
};
