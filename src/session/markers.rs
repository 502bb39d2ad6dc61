// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::VecDeque;

/// Playback markers sent to the telephony side and not yet acknowledged.
///
/// One marker is pushed per forwarded audio chunk; each `mark` frame from
/// the telephony side acknowledges the oldest one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerQueue {
    pending: VecDeque<String>,
}

impl MarkerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>) {
        self.pending.push_back(name.into());
    }

    /// Pop the oldest pending marker. `None` if nothing was pending.
    pub fn acknowledge(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
