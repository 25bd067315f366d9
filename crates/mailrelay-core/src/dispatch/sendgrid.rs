//! SendGrid v3 mail send API
//! See: https://docs.sendgrid.com/api-reference/mail-send/mail-send

use super::MailDispatcher;
use async_trait::async_trait;
use mailrelay_common::config::SendGridConfig;
use mailrelay_common::types::{Attachment, OutboundMessage};
use mailrelay_common::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<SendAttachment<'a>>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct SendAttachment<'a> {
    content: &'a str,
    filename: &'a str,
    #[serde(rename = "type", skip_serializing_if = "str::is_empty")]
    content_type: &'a str,
    disposition: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_id: Option<&'a str>,
}

impl<'a> From<&'a Attachment> for SendAttachment<'a> {
    fn from(attachment: &'a Attachment) -> Self {
        let content_id = attachment.content_id.as_deref().filter(|id| !id.is_empty());
        Self {
            content: &attachment.base64_data,
            filename: &attachment.file_name,
            content_type: &attachment.content_type,
            disposition: if content_id.is_some() { "inline" } else { "attachment" },
            content_id,
        }
    }
}

impl<'a> From<&'a OutboundMessage> for SendRequest<'a> {
    fn from(message: &'a OutboundMessage) -> Self {
        Self {
            personalizations: vec![Personalization {
                to: vec![Address { email: &message.to }],
            }],
            from: Address {
                email: &message.from,
            },
            subject: &message.subject,
            content: vec![Content {
                content_type: "text/html",
                value: &message.body,
            }],
            attachments: message.attachments.iter().map(SendAttachment::from).collect(),
        }
    }
}

/// Dispatcher posting to the SendGrid API
pub struct SendGridDispatcher {
    client: Client,
    api_url: String,
    api_key: String,
}

impl SendGridDispatcher {
    pub fn new(config: &SendGridConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::Config("dispatch.sendgrid.api_key is not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl MailDispatcher for SendGridDispatcher {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    async fn dispatch(&self, message: &OutboundMessage) -> Result<()> {
        let url = format!("{}/v3/mail/send", self.api_url);
        debug!(to = %message.to, attachments = message.attachments.len(), "Sending via SendGrid");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&SendRequest::from(message))
            .send()
            .await
            .map_err(|e| {
                warn!("SendGrid request failed: {}", e);
                Error::Dispatch(format!("SendGrid request failed: {}", e))
            })?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Dispatch(format!(
                "SendGrid did not accept the message. The response was: {}\n{}",
                status, body
            )));
        }

        Ok(())
    }
}
