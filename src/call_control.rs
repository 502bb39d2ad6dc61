// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Ending calls through the telephony provider.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{TwilioCredentials, DEFAULT_HTTP_TIMEOUT};
use crate::error::{RelayError, Result};
use crate::utils::helpers::http_client;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Call-management collaborator used when a hang-up phrase is heard.
#[async_trait]
pub trait CallControl: Send + Sync {
    /// Hang up the in-progress call identified by `call_id`.
    async fn end_call(&self, call_id: &str) -> Result<()>;
}

/// Ends calls by setting their status to `completed` over the Twilio REST API.
pub struct TwilioCallControl {
    client: reqwest::Client,
    credentials: TwilioCredentials,
    base_url: String,
    timeout: Duration,
}

impl fmt::Debug for TwilioCallControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwilioCallControl")
            .field("account_sid", &self.credentials.account_sid)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TwilioCallControl {
    pub fn new(credentials: TwilioCredentials) -> Result<Self> {
        Ok(Self {
            client: http_client(DEFAULT_HTTP_TIMEOUT)?,
            credentials,
            base_url: TWILIO_API_BASE.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        })
    }

    /// Builder method: point at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builder method: bound on each API request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn call_url(&self, call_id: &str) -> String {
        format!(
            "{}/Accounts/{}/Calls/{}.json",
            self.base_url.trim_end_matches('/'),
            self.credentials.account_sid,
            call_id
        )
    }
}

#[async_trait]
impl CallControl for TwilioCallControl {
    async fn end_call(&self, call_id: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.call_url(call_id))
            .timeout(self.timeout)
            .basic_auth(
                &self.credentials.account_sid,
                Some(&self.credentials.auth_token),
            )
            .form(&[("Status", "completed")])
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            tracing::info!(call_id, "Call ended");
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(RelayError::CallControl(format!("{status}: {body}")))
        }
    }
}
