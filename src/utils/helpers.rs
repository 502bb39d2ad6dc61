// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Shared utility functions.

use std::time::Duration;

use base64::Engine;

use crate::config::DEFAULT_HTTP_CONNECT_TIMEOUT;
use crate::error;

/// Encode bytes to base64 using the standard alphabet.
pub fn encode_base64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode a standard-alphabet base64 string.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(data)
}

/// HTTP client for collaborator APIs. `timeout` bounds each whole request.
pub fn http_client(timeout: Duration) -> error::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(DEFAULT_HTTP_CONNECT_TIMEOUT.min(timeout))
        .build()?)
}

/// Case-insensitive whole-word search for `phrase` in `text`.
///
/// `phrase` may contain several words; they must appear consecutively.
/// "bye" matches "Okay, bye!" but not "maybe".
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let words = |s: &str| -> Vec<String> {
        s.split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect()
    };
    let needle = words(phrase);
    if needle.is_empty() {
        return false;
    }
    words(text)
        .windows(needle.len())
        .any(|window| window == needle.as_slice())
}
