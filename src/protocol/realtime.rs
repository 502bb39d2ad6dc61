// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! OpenAI Realtime API event types (the subset the relay speaks).
//!
//! Server events are deserialized into [`RealtimeEvent`]; anything the relay
//! does not act on lands in [`RealtimeEvent::Other`]. Client events are
//! serialized from [`RealtimeCommand`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Audio encoding negotiated for both directions of the realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AudioFormat {
    /// 8 kHz mu-law, byte-compatible with the telephony leg.
    #[default]
    #[serde(rename = "g711_ulaw")]
    G711Ulaw,
    /// 24 kHz little-endian PCM16.
    #[serde(rename = "pcm16")]
    Pcm16,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::G711Ulaw => "g711_ulaw",
            Self::Pcm16 => "pcm16",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "g711_ulaw" | "ulaw" | "mulaw" => Ok(Self::G711Ulaw),
            "pcm16" => Ok(Self::Pcm16),
            other => Err(RelayError::Config(format!("unsupported audio format '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// An event received from the realtime socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum RealtimeEvent {
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: serde_json::Value,
    },
    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default)]
        session: serde_json::Value,
    },
    /// The caller's speech was transcribed.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted {
        #[serde(default)]
        item_id: Option<String>,
        #[serde(default)]
        transcript: String,
    },
    /// A chunk of assistant audio.
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(default)]
        item_id: Option<String>,
        #[serde(default)]
        response_id: Option<String>,
        delta: String,
    },
    /// The assistant finished a response.
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseBody,
    },
    /// Server VAD heard the caller start talking.
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: Option<u64>,
        #[serde(default)]
        item_id: Option<String>,
    },
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        audio_end_ms: Option<u64>,
    },
    #[serde(rename = "error")]
    Error { error: ErrorDetail },
    #[serde(other)]
    Other,
}

impl RealtimeEvent {
    /// Parse one text message from the realtime socket.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Just the `type` field, used to name events the relay ignores.
#[derive(Debug, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
}

impl EventEnvelope {
    pub fn event_type_of(text: &str) -> Option<String> {
        serde_json::from_str::<EventEnvelope>(text)
            .ok()
            .and_then(|e| e.event_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseBody {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OutputItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub transcript: Option<String>,
}

impl ResponseBody {
    /// Recognized transcripts of the assistant's audio segments, in order.
    /// Blank transcripts are skipped.
    pub fn assistant_transcripts(&self) -> impl Iterator<Item = &str> {
        self.output
            .iter()
            .filter(|item| item.role.as_deref() == Some("assistant"))
            .flat_map(|item| item.content.iter())
            .filter(|part| part.kind == "audio")
            .filter_map(|part| part.transcript.as_deref())
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// An event sent to the realtime socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum RealtimeCommand {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionSettings },
    /// Forward caller audio (base64).
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    /// Cut an assistant item at the point the caller stopped hearing it.
    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate {
        item_id: String,
        content_index: u32,
        audio_end_ms: u64,
    },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl RealtimeCommand {
    pub fn append(audio: impl Into<String>) -> Self {
        Self::InputAudioBufferAppend {
            audio: audio.into(),
        }
    }

    pub fn truncate(item_id: impl Into<String>, audio_end_ms: u64) -> Self {
        Self::ConversationItemTruncate {
            item_id: item_id.into(),
            content_index: 0,
            audio_end_ms,
        }
    }

    /// A user text message asking the assistant to open the call.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem {
                kind: "message".to_string(),
                role: "user".to_string(),
                content: vec![InputContent {
                    kind: "input_text".to_string(),
                    text: text.into(),
                }],
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The `session` object of `session.update`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSettings {
    pub turn_detection: TurnDetection,
    pub input_audio_format: AudioFormat,
    pub output_audio_format: AudioFormat,
    pub voice: String,
    pub instructions: String,
    pub modalities: Vec<String>,
    pub temperature: f64,
    pub input_audio_transcription: InputAudioTranscription,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
}

impl TurnDetection {
    pub fn server_vad() -> Self {
        Self {
            kind: "server_vad".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<InputContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}
