// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Running transcript of a call and its persistence.
//!
//! A [`Transcript`] is append-only and ordered by detection time. After each
//! append the session hands a snapshot to the [`TranscriptFlusher`], which
//! writes it through a [`TranscriptStore`] on its own task so the relay
//! never waits on the store.

pub mod flusher;
pub mod store;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use flusher::{FlushHandle, TranscriptFlusher};
pub use store::{load_history, InMemoryTranscriptStore, RestTranscriptStore, TranscriptStore};

/// Who said it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Assistant => write!(f, "Assistant"),
        }
    }
}

/// One utterance. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    /// `"User: hello"` style line.
    pub fn line(&self) -> String {
        format!("{}: {}", self.speaker, self.text)
    }

    /// Inverse of [`line`](Self::line). `None` for an unknown speaker or
    /// blank text.
    pub fn from_line(line: &str, timestamp: DateTime<Utc>) -> Option<Self> {
        let (speaker, text) = line.split_once(": ")?;
        let speaker = match speaker.trim() {
            "User" => Speaker::User,
            "Assistant" => Speaker::Assistant,
            _ => return None,
        };
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            speaker,
            text: text.to_string(),
            timestamp,
        })
    }
}

/// Ordered, append-only sequence of utterances for one call.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an utterance stamped with the current time.
    ///
    /// Text that is empty after trimming is ignored and `None` is returned.
    pub fn append(&mut self, speaker: Speaker, text: &str) -> Option<&TranscriptEntry> {
        self.append_at(speaker, text, Utc::now())
    }

    pub fn append_at(
        &mut self,
        speaker: Speaker,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Option<&TranscriptEntry> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.entries.push(TranscriptEntry {
            speaker,
            text: text.to_string(),
            timestamp,
        });
        self.entries.last()
    }

    /// Place entries from an earlier leg of the same call ahead of this one's.
    pub fn prepend(&mut self, earlier: Vec<TranscriptEntry>) {
        let current = std::mem::replace(&mut self.entries, earlier);
        self.entries.extend(current);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identifies the call record a transcript belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKeys {
    pub call_id: String,
    pub stream_id: Option<String>,
}
