// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Wire types for the two sockets a media session bridges.
//!
//! Both protocols are JSON, one message per WebSocket text frame. Each side
//! is modelled as a closed enum so every message kind is handled by an
//! exhaustive `match`.

pub mod realtime;
pub mod twilio;

pub use realtime::{AudioFormat, RealtimeCommand, RealtimeEvent, SessionSettings};
pub use twilio::{TelephonyCommand, TelephonyFrame};
