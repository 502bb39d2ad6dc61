// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Runtime configuration.
//!
//! [`RelayConfig::from_env`] reads the process environment (after loading a
//! `.env` file if one exists). [`SessionConfig`] holds the per-call realtime
//! settings and can also be built directly with its `with_*` methods.

use std::env;
use std::time::Duration;

use crate::error::{RelayError, Result};
use crate::protocol::realtime::{
    AudioFormat, InputAudioTranscription, SessionSettings, TurnDetection,
};

pub const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-10-01";
pub const DEFAULT_VOICE: &str = "sage";
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful AI assistant.";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_PORT: u16 = 5050;
/// Upper bound on one request to the transcript store or the call-control API.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for one media session's realtime leg.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub api_key: String,
    pub realtime_url: String,
    pub model: String,
    pub voice: String,
    pub instructions: String,
    pub temperature: f64,
    pub audio_format: AudioFormat,
    pub transcription_model: String,
    /// When set, the assistant is prompted to speak first with this greeting.
    pub greeting: Option<String>,
    /// Phrases that end the call when either party says them.
    pub hangup_phrases: Vec<String>,
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            realtime_url: DEFAULT_REALTIME_URL.to_string(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            audio_format: AudioFormat::G711Ulaw,
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            greeting: None,
            hangup_phrases: vec!["goodbye".to_string(), "bye".to_string()],
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_audio_format(mut self, format: AudioFormat) -> Self {
        self.audio_format = format;
        self
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = Some(greeting.into());
        self
    }

    pub fn with_hangup_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hangup_phrases = phrases.into_iter().map(Into::into).collect();
        self
    }

    /// Full WebSocket URL including the model query parameter.
    pub fn endpoint(&self) -> String {
        format!("{}?model={}", self.realtime_url.trim_end_matches('/'), self.model)
    }

    /// The `session` object sent once when the realtime leg opens.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            turn_detection: TurnDetection::server_vad(),
            input_audio_format: self.audio_format,
            output_audio_format: self.audio_format,
            voice: self.voice.clone(),
            instructions: self.instructions.clone(),
            modalities: vec!["text".to_string(), "audio".to_string()],
            temperature: self.temperature,
            input_audio_transcription: InputAudioTranscription {
                model: self.transcription_model.clone(),
            },
        }
    }
}

/// REST endpoint the transcript is written to.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub api_key: String,
    pub table: String,
}

/// Credentials for ending calls through the Twilio REST API.
#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
}

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub session: SessionConfig,
    pub store: Option<StoreConfig>,
    pub twilio: Option<TwilioCredentials>,
}

impl RelayConfig {
    /// Load configuration from environment variables.
    ///
    /// `OPENAI_API_KEY` is required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_var("PORT", DEFAULT_PORT)?;

        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| RelayError::Config("OPENAI_API_KEY must be set".to_string()))?;

        let mut session = SessionConfig::new(api_key)
            .with_temperature(parse_var("TEMPERATURE", DEFAULT_TEMPERATURE)?)
            .with_audio_format(parse_var("REALTIME_AUDIO_FORMAT", AudioFormat::G711Ulaw)?);
        if let Ok(url) = env::var("REALTIME_URL") {
            session.realtime_url = url;
        }
        if let Ok(model) = env::var("REALTIME_MODEL") {
            session = session.with_model(model);
        }
        if let Ok(voice) = env::var("VOICE") {
            session = session.with_voice(voice);
        }
        if let Ok(instructions) = env::var("SYSTEM_MESSAGE") {
            session = session.with_instructions(instructions);
        }
        if let Some(greeting) = non_empty_var("GREETING") {
            session = session.with_greeting(greeting);
        }
        if let Ok(phrases) = env::var("HANGUP_PHRASES") {
            session = session.with_hangup_phrases(parse_list(&phrases));
        }

        let store = match (non_empty_var("TRANSCRIPT_STORE_URL"), non_empty_var("TRANSCRIPT_STORE_KEY")) {
            (Some(url), Some(api_key)) => Some(StoreConfig {
                url,
                api_key,
                table: env::var("TRANSCRIPT_STORE_TABLE")
                    .unwrap_or_else(|_| "voice_conversations".to_string()),
            }),
            (None, None) => None,
            _ => {
                return Err(RelayError::Config(
                    "TRANSCRIPT_STORE_URL and TRANSCRIPT_STORE_KEY must be set together".to_string(),
                ))
            }
        };

        let twilio = match (non_empty_var("TWILIO_ACCOUNT_SID"), non_empty_var("TWILIO_AUTH_TOKEN")) {
            (Some(account_sid), Some(auth_token)) => Some(TwilioCredentials {
                account_sid,
                auth_token,
            }),
            _ => None,
        };

        Ok(Self {
            host,
            port,
            session,
            store,
            twilio,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid {name} '{raw}': {e}"))),
        None => Ok(default),
    }
}

/// Split a comma-separated list, dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
