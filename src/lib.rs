// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! callrelay - bridges a phone call's media stream with a realtime speech AI.
//!
//! Caller audio arrives over a Twilio Media Streams WebSocket and is forwarded
//! to an OpenAI Realtime session; the assistant's audio is played back to the
//! caller. When the caller talks over the assistant (barge-in) the in-flight
//! response is truncated at the point the caller stopped hearing it and the
//! caller's playback buffer is cleared. A transcript of both sides is kept
//! per call and persisted in the background.
//!
//! The core is [`session::MediaSession`]; [`server`] exposes it over HTTP.

pub mod audio;
pub mod call_control;
pub mod config;
pub mod error;
pub mod prelude;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transcript;
pub mod transport;
pub mod utils;

pub use error::{RelayError, Result};
