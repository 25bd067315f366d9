//! SMTP relay dispatch

use super::MailDispatcher;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use lettre::{
    message::{header::ContentType, Attachment as MailAttachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use mailrelay_common::config::SmtpConfig;
use mailrelay_common::types::{Attachment, OutboundMessage};
use mailrelay_common::{Error, Result};
use std::time::Duration;
use tracing::debug;

/// Dispatcher sending through an SMTP relay
pub struct SmtpDispatcher {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpDispatcher {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let host = config
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Config("dispatch.smtp.host is not set".to_string()))?;

        let builder = match config.security.as_str() {
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            "starttls" => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
            "none" => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)),
            other => {
                return Err(Error::Config(format!("Unknown SMTP security mode: {}", other)));
            }
        }
        .map_err(|e| Error::Config(format!("Failed to create SMTP transport: {}", e)))?;

        let mut transport = builder.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            transport = transport.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let mailer = transport
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        Ok(Self { mailer })
    }
}

fn mailbox(address: &str, field: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| Error::Validation(format!("Invalid {} address '{}': {}", field, address, e)))
}

fn attachment_part(attachment: &Attachment) -> Result<SinglePart> {
    let data = STANDARD
        .decode(attachment.base64_data.trim())
        .map_err(|e| {
            Error::Validation(format!(
                "Attachment '{}' is not valid base64: {}",
                attachment.file_name, e
            ))
        })?;
    let content_type = ContentType::parse(&attachment.content_type)
        .or_else(|_| ContentType::parse("application/octet-stream"))
        .map_err(|e| Error::Validation(format!("Invalid attachment content type: {}", e)))?;

    let part = match attachment.content_id.as_deref().filter(|id| !id.is_empty()) {
        Some(content_id) => MailAttachment::new_inline(content_id.to_string()),
        None => MailAttachment::new(attachment.file_name.clone()),
    };
    Ok(part.body(data, content_type))
}

/// Build the MIME message; the body is sent as HTML
pub(crate) fn build_message(message: &OutboundMessage) -> Result<Message> {
    let builder = Message::builder()
        .from(mailbox(&message.from, "from")?)
        .to(mailbox(&message.to, "to")?)
        .subject(message.subject.as_str());

    let email = if message.attachments.is_empty() {
        builder
            .header(ContentType::TEXT_HTML)
            .body(message.body.clone())
    } else {
        let mut parts = MultiPart::mixed().singlepart(SinglePart::html(message.body.clone()));
        for attachment in &message.attachments {
            parts = parts.singlepart(attachment_part(attachment)?);
        }
        builder.multipart(parts)
    };

    email.map_err(|e| Error::Validation(format!("Failed to build email: {}", e)))
}

#[async_trait]
impl MailDispatcher for SmtpDispatcher {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn dispatch(&self, message: &OutboundMessage) -> Result<()> {
        let email = build_message(message)?;

        let response = self
            .mailer
            .send(email)
            .await
            .map_err(|e| Error::Dispatch(format!("SMTP relay rejected the message: {}", e)))?;
        debug!(to = %message.to, code = %response.code(), "Email sent via SMTP");

        Ok(())
    }
}
