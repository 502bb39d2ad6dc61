// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Barge-in handling.
//!
//! When the caller starts talking over the assistant, the assistant item is
//! truncated at the point the caller stopped hearing it and the telephony
//! side drops whatever audio it still has buffered.

use crate::protocol::{RealtimeCommand, TelephonyCommand};
use crate::session::state::RelayState;
use crate::transport::Outbox;

/// What an interruption did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub item_id: String,
    pub audio_end_ms: u64,
}

/// Cut the in-flight utterance short.
///
/// Does nothing, and writes nothing, unless audio of the current item has
/// reached the caller: an item id is set, the response anchor is set and at
/// least one playback marker is pending. Otherwise sends
/// `conversation.item.truncate` and `clear`, then empties the marker queue
/// and forgets the item and its anchor.
pub fn interrupt(
    state: &mut RelayState,
    realtime: &Outbox<RealtimeCommand>,
    telephony: &Outbox<TelephonyCommand>,
) -> Option<Truncation> {
    if state.markers.is_empty() {
        return None;
    }
    let audio_end_ms = state.clock.elapsed_since_response_start()?;
    let item_id = state.current_item_id.clone()?;

    tracing::info!(item_id = %item_id, elapsed_ms = audio_end_ms, "Caller interrupted assistant");

    if let Err(e) = realtime.send(RealtimeCommand::truncate(item_id.clone(), audio_end_ms)) {
        tracing::warn!("Truncate not sent: {}", e);
    }
    if let Some(stream_id) = state.stream_id.as_deref() {
        if let Err(e) = telephony.send(TelephonyCommand::clear(stream_id)) {
            tracing::warn!("Clear not sent: {}", e);
        }
    }

    state.markers.clear();
    state.current_item_id = None;
    state.clock.clear_response_start();

    Some(Truncation {
        item_id,
        audio_end_ms,
    })
}
