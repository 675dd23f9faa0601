use serde::{Deserialize, Serialize};

/// Inbound customer reply as delivered by the carrier webhook.
#[derive(Clone, Debug, Deserialize)]
pub struct InboundSms {
    #[serde(alias = "From")]
    pub from: String,
    #[serde(alias = "Body", default)]
    pub body: String,
}

/// A message handed to the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutboundSms {
    pub to: String,
    pub body: String,
}

/// What the carrier told us about an accepted message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}
