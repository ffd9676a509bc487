//! SMS provider — Twilio-compatible Messages REST endpoint.
//!
//! `api_base` is configurable so tests and self-hosted gateways that speak
//! the same API can stand in for Twilio.

use std::time::Duration;

use async_trait::async_trait;

use rollcall_core::config::SmsConfig;
use rollcall_core::types::ChannelKind;

use crate::{Message, Provider, SendError};

/// Twilio-compatible SMS provider.
pub struct SmsProvider {
    config: SmsConfig,
    client: reqwest::Client,
}

impl SmsProvider {
    pub fn new(config: SmsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn is_configured(&self) -> bool {
        !self.config.account_sid.is_empty() && !self.config.from_number.is_empty()
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl Provider for SmsProvider {
    fn name(&self) -> &'static str {
        "twilio"
    }

    fn channel(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn available(&self) -> bool {
        self.is_configured()
    }

    async fn send(&self, to: &str, message: &Message) -> Result<String, SendError> {
        if !self.is_configured() {
            return Err(SendError::Unavailable);
        }

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.from_number.as_str()),
                ("Body", message.body.as_str()),
            ])
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| SendError::Transient(format!("SMS API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return if status.is_client_error() {
                Err(SendError::Permanent(format!("SMS API error {status}: {error_text}")))
            } else {
                Err(SendError::Transient(format!("SMS API error {status}: {error_text}")))
            };
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SendError::Transient(format!("Invalid SMS API response: {e}")))?;

        let sid = result["sid"].as_str().unwrap_or("unknown").to_string();
        tracing::info!("📱 SMS sent to: {to}");
        Ok(sid)
    }
}
