// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Media-time bookkeeping for barge-in.

/// Tracks telephony media time and where the current assistant utterance
/// began playing, both in milliseconds since the stream started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClockTracker {
    latest_media_timestamp_ms: u64,
    response_start_timestamp_ms: Option<u64>,
}

impl ClockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest_media_timestamp_ms(&self) -> u64 {
        self.latest_media_timestamp_ms
    }

    pub fn response_start_timestamp_ms(&self) -> Option<u64> {
        self.response_start_timestamp_ms
    }

    /// Record the timestamp of a media frame. A value below the current
    /// maximum is ignored.
    pub fn observe(&mut self, timestamp_ms: u64) {
        if timestamp_ms < self.latest_media_timestamp_ms {
            tracing::warn!(
                timestamp_ms,
                latest_ms = self.latest_media_timestamp_ms,
                "Media timestamp went backwards, keeping latest"
            );
            return;
        }
        self.latest_media_timestamp_ms = timestamp_ms;
    }

    /// Anchor the current utterance at the latest media time, unless it is
    /// already anchored. Returns `true` if this call set the anchor.
    pub fn mark_response_start(&mut self) -> bool {
        if self.response_start_timestamp_ms.is_some() {
            return false;
        }
        self.response_start_timestamp_ms = Some(self.latest_media_timestamp_ms);
        true
    }

    pub fn clear_response_start(&mut self) {
        self.response_start_timestamp_ms = None;
    }

    /// Media time elapsed since the utterance was anchored, clamped at zero.
    pub fn elapsed_since_response_start(&self) -> Option<u64> {
        let start = self.response_start_timestamp_ms?;
        if self.latest_media_timestamp_ms < start {
            tracing::warn!(
                start_ms = start,
                latest_ms = self.latest_media_timestamp_ms,
                "Negative playback time, clamping to 0"
            );
        }
        Some(self.latest_media_timestamp_ms.saturating_sub(start))
    }

    /// Back to a fresh stream: time zero, no utterance anchored.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[cfg(test)]
    pub(crate) fn set_response_start(&mut self, timestamp_ms: u64) {
        self.response_start_timestamp_ms = Some(timestamp_ms);
    }
}
