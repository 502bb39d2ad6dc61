// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Persistence collaborator for call transcripts.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{StoreConfig, DEFAULT_HTTP_TIMEOUT};
use crate::error::{RelayError, Result};
use crate::transcript::{CorrelationKeys, Speaker, TranscriptEntry};
use crate::utils::helpers::http_client;

/// Reads and writes the full, ordered transcript of a call.
///
/// A session loads what is already stored for its call once the call id is
/// known and keeps appending after it. Each write then replaces the stored
/// transcript with the complete sequence, so a lost write is repaired by the
/// next.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn append_transcript(
        &self,
        keys: &CorrelationKeys,
        transcript: &[TranscriptEntry],
    ) -> Result<()>;

    /// Transcript stored so far for `call_id`, empty if there is none.
    async fn load_transcript(&self, _call_id: &str) -> Result<Vec<TranscriptEntry>> {
        Ok(Vec::new())
    }
}

/// Earlier transcript of `call_id`. A failed read is logged and treated as
/// no history.
pub async fn load_history(store: &dyn TranscriptStore, call_id: &str) -> Vec<TranscriptEntry> {
    match store.load_transcript(call_id).await {
        Ok(history) => {
            if !history.is_empty() {
                tracing::info!(call_id, entries = history.len(), "Resuming stored transcript");
            }
            history
        }
        Err(e) => {
            tracing::warn!(call_id, "Failed to load stored transcript: {}", e);
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Keeps transcripts in process memory, keyed by call id.
#[derive(Debug, Default)]
pub struct InMemoryTranscriptStore {
    inner: Mutex<InMemoryInner>,
}

#[derive(Debug, Default)]
struct InMemoryInner {
    transcripts: HashMap<String, Vec<TranscriptEntry>>,
    writes: usize,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest transcript written for `call_id`.
    pub async fn transcript(&self, call_id: &str) -> Option<Vec<TranscriptEntry>> {
        self.inner.lock().await.transcripts.get(call_id).cloned()
    }

    /// Number of successful writes so far.
    pub async fn writes(&self) -> usize {
        self.inner.lock().await.writes
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn append_transcript(
        &self,
        keys: &CorrelationKeys,
        transcript: &[TranscriptEntry],
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .transcripts
            .insert(keys.call_id.clone(), transcript.to_vec());
        inner.writes += 1;
        Ok(())
    }

    async fn load_transcript(&self, call_id: &str) -> Result<Vec<TranscriptEntry>> {
        Ok(self.transcript(call_id).await.unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// REST (PostgREST-compatible)
// ---------------------------------------------------------------------------

/// Updates the call's row through a PostgREST-style HTTP API.
///
/// Issues `PATCH {url}/rest/v1/{table}?call_sid=eq.{call_id}` with the
/// transcript as `"User: ..."` lines plus per-message timestamps.
pub struct RestTranscriptStore {
    client: reqwest::Client,
    config: StoreConfig,
    timeout: Duration,
}

impl fmt::Debug for RestTranscriptStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestTranscriptStore")
            .field("url", &self.config.url)
            .field("table", &self.config.table)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct TranscriptUpdate<'a> {
    transcript: Vec<String>,
    message_timestamps: Vec<MessageTimestamp<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageTimestamp<'a> {
    message: String,
    timestamp: String,
    #[serde(rename = "type")]
    kind: &'a str,
}

impl<'a> TranscriptUpdate<'a> {
    fn from_entries(entries: &'a [TranscriptEntry]) -> Self {
        Self {
            transcript: entries.iter().map(TranscriptEntry::line).collect(),
            message_timestamps: entries
                .iter()
                .map(|e| MessageTimestamp {
                    message: e.line(),
                    timestamp: e.timestamp.to_rfc3339(),
                    kind: match e.speaker {
                        Speaker::User => "user",
                        Speaker::Assistant => "assistant",
                    },
                })
                .collect(),
        }
    }
}

/// One row as returned by `select=transcript,message_timestamps`.
#[derive(Debug, Default, Deserialize)]
struct StoredRecord {
    #[serde(default)]
    transcript: Option<Vec<String>>,
    #[serde(default)]
    message_timestamps: Option<Vec<StoredTimestamp>>,
}

#[derive(Debug, Deserialize)]
struct StoredTimestamp {
    message: String,
    #[serde(default)]
    timestamp: Option<String>,
}

impl StoredRecord {
    fn into_entries(self) -> Vec<TranscriptEntry> {
        let timestamps = self.message_timestamps.unwrap_or_default();
        self.transcript
            .unwrap_or_default()
            .iter()
            .enumerate()
            .filter_map(|(i, line)| {
                let timestamp = timestamps
                    .get(i)
                    .filter(|t| t.message == *line)
                    .and_then(|t| t.timestamp.as_deref())
                    .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);
                let entry = TranscriptEntry::from_line(line, timestamp);
                if entry.is_none() {
                    tracing::debug!(line = %line, "Skipping unrecognised stored transcript line");
                }
                entry
            })
            .collect()
    }
}

impl RestTranscriptStore {
    pub fn new(config: StoreConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(DEFAULT_HTTP_TIMEOUT)?,
            config,
            timeout: DEFAULT_HTTP_TIMEOUT,
        })
    }

    /// Builder method: bound on each request to the store.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn record_url(&self, call_id: &str) -> String {
        format!(
            "{}/rest/v1/{}?call_sid=eq.{}",
            self.config.url.trim_end_matches('/'),
            self.config.table,
            call_id
        )
    }
}

#[async_trait]
impl TranscriptStore for RestTranscriptStore {
    async fn append_transcript(
        &self,
        keys: &CorrelationKeys,
        transcript: &[TranscriptEntry],
    ) -> Result<()> {
        let body = TranscriptUpdate::from_entries(transcript);
        let resp = self
            .client
            .patch(self.record_url(&keys.call_id))
            .timeout(self.timeout)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .header("Prefer", "return=minimal")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(call_id = %keys.call_id, entries = transcript.len(), "Transcript stored");
            Ok(())
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(RelayError::Store(format!("{status}: {text}")))
        }
    }

    async fn load_transcript(&self, call_id: &str) -> Result<Vec<TranscriptEntry>> {
        let resp = self
            .client
            .get(format!(
                "{}&select=transcript,message_timestamps",
                self.record_url(call_id)
            ))
            .timeout(self.timeout)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RelayError::Store(format!("{status}: {text}")));
        }
        let rows: Vec<StoredRecord> = resp.json().await?;
        Ok(rows
            .into_iter()
            .next()
            .map(StoredRecord::into_entries)
            .unwrap_or_default())
    }
}
