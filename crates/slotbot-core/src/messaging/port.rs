use async_trait::async_trait;

use crate::{messaging::types::SendReceipt, Result};

/// Outbound SMS port.
///
/// `Ok` means the carrier accepted the message; any failure is an
/// [`Error::Transport`](crate::Error::Transport). Implementations do not retry.
#[async_trait]
pub trait SmsPort: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<SendReceipt>;
}
