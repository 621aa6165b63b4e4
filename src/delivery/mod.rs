//! Outbound delivery of finished capture artifacts.

pub mod discord;

use anyhow::Result;
use async_trait::async_trait;

pub use discord::DiscordSink;

/// One message with a single file attachment.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Message text shown above the attachment.
    pub content: Option<String>,
}

/// Delivery is best-effort: an error is reported to the caller, who only
/// logs it.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    async fn deliver(&self, upload: Upload) -> Result<()>;
}
