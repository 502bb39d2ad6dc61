// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Twilio Media Streams wire format.
//!
//! Inbound frames (telephony -> relay):
//!
//! - `connected` - WebSocket accepted by the provider
//! - `start` - stream started, carries `streamSid` and optionally `callSid`
//! - `media` - base64 mu-law 8 kHz payload with a millisecond timestamp
//! - `mark` - a previously sent playback marker finished playing
//! - `stop` - stream ended
//! - `dtmf` - keypad digit
//!
//! Outbound frames (relay -> telephony): `media`, `mark` and `clear`.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;

/// Name used for every playback marker the relay sends.
pub const RESPONSE_MARK_NAME: &str = "responsePart";

/// A frame received from the telephony socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyFrame {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        start: StartPayload,
    },
    Media {
        media: MediaPayload,
    },
    Mark {
        mark: MarkPayload,
    },
    Stop {
        #[serde(default)]
        stop: Option<serde_json::Value>,
    },
    Dtmf {
        dtmf: DtmfPayload,
    },
}

impl TelephonyFrame {
    /// Parse one text message from the telephony socket.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Short event name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Start { .. } => "start",
            Self::Media { .. } => "media",
            Self::Mark { .. } => "mark",
            Self::Stop { .. } => "stop",
            Self::Dtmf { .. } => "dtmf",
        }
    }
}

/// Payload of the `start` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StartPayload {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "accountSid", default)]
    pub account_sid: Option<String>,
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: HashMap<String, String>,
}

/// Payload of the `media` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaPayload {
    /// Base64 mu-law audio.
    pub payload: String,
    /// Milliseconds since the stream started. Twilio sends this as a string.
    #[serde(default, deserialize_with = "deserialize_opt_millis")]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub track: Option<String>,
}

/// Payload of the `mark` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

/// Payload of the `dtmf` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DtmfPayload {
    pub digit: String,
}

fn deserialize_opt_millis<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Number(u64),
        Text(String),
    }

    match Option::<Millis>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Millis::Number(n)) => Ok(Some(n)),
        Some(Millis::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// A frame sent to the telephony socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyCommand {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: OutboundMark,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMark {
    pub name: String,
}

impl TelephonyCommand {
    pub fn media(stream_sid: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::Media {
            stream_sid: stream_sid.into(),
            media: OutboundMedia {
                payload: payload.into(),
            },
        }
    }

    pub fn mark(stream_sid: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Mark {
            stream_sid: stream_sid.into(),
            mark: OutboundMark { name: name.into() },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        Self::Clear {
            stream_sid: stream_sid.into(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
