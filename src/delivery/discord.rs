use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::AUTHORIZATION,
    multipart::{Form, Part},
    Client,
};
use std::time::Duration;

use crate::settings::DeliveryTarget;

use super::{DeliverySink, Upload};

const DISCORD_API: &str = "https://discord.com/api/v10";
const REQUEST_TIMEOUT_SECS: u64 = 60;

pub struct DiscordSink {
    client: Client,
    target: DeliveryTarget,
}

impl DiscordSink {
    pub fn new(target: DeliveryTarget) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, target })
    }

    fn endpoint(&self) -> String {
        match &self.target {
            DeliveryTarget::Webhook { url } => url.clone(),
            DeliveryTarget::Channel { channel_id, .. } => {
                format!("{DISCORD_API}/channels/{channel_id}/messages")
            }
        }
    }
}

fn message_form(upload: Upload) -> Result<Form> {
    let payload = serde_json::json!({
        "content": upload.content.unwrap_or_default(),
    });
    let attachment = Part::bytes(upload.bytes)
        .file_name(upload.file_name)
        .mime_str("application/octet-stream")
        .context("invalid attachment mime type")?;

    Ok(Form::new()
        .text("payload_json", payload.to_string())
        .part("files[0]", attachment))
}

#[async_trait]
impl DeliverySink for DiscordSink {
    fn name(&self) -> &'static str {
        match self.target {
            DeliveryTarget::Webhook { .. } => "discord-webhook",
            DeliveryTarget::Channel { .. } => "discord-channel",
        }
    }

    async fn deliver(&self, upload: Upload) -> Result<()> {
        let file_name = upload.file_name.clone();
        let mut request = self.client.post(self.endpoint()).multipart(message_form(upload)?);
        if let DeliveryTarget::Channel { bot_token, .. } = &self.target {
            request = request.header(AUTHORIZATION, format!("Bot {bot_token}"));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send {file_name} via {}", self.name()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{} rejected {file_name}: {status} {body}", self.name());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_endpoint_targets_messages_api() {
        let sink = DiscordSink::new(DeliveryTarget::Channel {
            channel_id: "667741905228136459".into(),
            bot_token: "token".into(),
        })
        .unwrap();
        assert_eq!(
            sink.endpoint(),
            "https://discord.com/api/v10/channels/667741905228136459/messages"
        );
        assert_eq!(sink.name(), "discord-channel");
    }

    #[test]
    fn webhook_endpoint_is_used_verbatim() {
        let url = "https://discord.com/api/webhooks/1234567890/abcdef";
        let sink = DiscordSink::new(DeliveryTarget::Webhook { url: url.into() }).unwrap();
        assert_eq!(sink.endpoint(), url);
        assert_eq!(sink.name(), "discord-webhook");
    }

    #[test]
    fn form_builds_with_and_without_content() {
        let upload = Upload {
            file_name: "Narva_RAAS_v1_Profile(1_2).csv.zst".into(),
            bytes: vec![1, 2, 3],
            content: None,
        };
        assert!(message_form(upload).is_ok());
    }
}
