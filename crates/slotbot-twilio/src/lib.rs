//! Twilio adapter for outbound SMS.
//!
//! Uses the Programmable Messaging `Messages.json` endpoint with HTTP basic auth.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use slotbot_core::{
    config::{Config, SmsTransport, DEFAULT_TWILIO_API_BASE},
    errors::Error,
    messaging::{port::SmsPort, types::SendReceipt},
    Result,
};
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct TwilioSms {
    account_sid: String,
    auth_token: String,
    from_number: String,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<i64>,
    message: Option<String>,
}

impl TwilioSms {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("twilio http client: {e}")))?;
        Ok(Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
            api_base: DEFAULT_TWILIO_API_BASE.to_string(),
            http,
        })
    }

    /// Point the client at another host (tests, regional edges).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Build a client from config, or `None` when the transport is not Twilio.
    pub fn from_config(cfg: &Config) -> Result<Option<Self>> {
        let SmsTransport::Twilio {
            account_sid,
            auth_token,
            from_number,
        } = &cfg.sms_transport
        else {
            return Ok(None);
        };
        Ok(Some(
            Self::new(
                account_sid.clone(),
                auth_token.clone(),
                from_number.clone(),
                cfg.sms_timeout,
            )?
            .with_api_base(cfg.twilio_api_base.clone()),
        ))
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }
}

#[async_trait]
impl SmsPort for TwilioSms {
    async fn send(&self, to: &str, body: &str) -> Result<SendReceipt> {
        let form = [
            ("From", self.from_number.as_str()),
            ("To", to),
            ("Body", body),
        ];

        let resp = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("twilio request error: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Transport(format!("twilio read error: {e}")))?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<ApiError>(&text) {
                Ok(ApiError {
                    code: Some(code),
                    message: Some(message),
                }) => format!("{code} {message}"),
                _ => text.chars().take(200).collect(),
            };
            warn!(to, %status, "twilio rejected message");
            return Err(Error::Transport(format!("twilio send failed: {status} {detail}")));
        }

        // A 2xx with an unexpected body still means the message was accepted.
        let receipt = match serde_json::from_str::<MessageResource>(&text) {
            Ok(m) => SendReceipt {
                sid: m.sid,
                status: m.status,
            },
            Err(_) => SendReceipt::default(),
        };
        debug!(to, sid = ?receipt.sid, "twilio accepted message");
        Ok(receipt)
    }
}
