// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Error type shared by the relay, its transports and its collaborators.

/// Errors produced while relaying a call.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Telephony socket error: {0}")]
    Telephony(#[from] axum::Error),
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid audio payload: {0}")]
    InvalidAudio(#[from] base64::DecodeError),
    #[error("{0} socket is closed")]
    SocketClosed(&'static str),
    #[error("Realtime handshake failed: {0}")]
    Handshake(String),
    #[error("Realtime handshake timed out after {0}s")]
    HandshakeTimeout(u64),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Transcript store error: {0}")]
    Store(String),
    #[error("Call control error: {0}")]
    CallControl(String),
}

impl RelayError {
    /// Whether the error concerns a single message rather than the connection.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Json(_) | Self::InvalidAudio(_))
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
