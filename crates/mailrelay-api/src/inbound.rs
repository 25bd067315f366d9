//! SendGrid Inbound Parse form decoding
//! See: https://docs.sendgrid.com/for-developers/parsing-email/setting-up-the-inbound-parse-webhook
//!
//! The default mode posts parsed fields (`from`, `to`, `html`, `text`,
//! `attachment-info` + `attachmentN` files). The raw mode posts the full
//! MIME message as `email`; bodies and attachments then come from
//! `mail-parser` while header fields posted alongside it take precedence.

use axum::extract::Multipart;
use base64::{engine::general_purpose::STANDARD, Engine};
use mail_parser::{MessageParser, MimeHeaders};
use mailrelay_common::types::{Attachment, EmailAddress, InboundMessage};
use mailrelay_common::{Error, Result};
use mailrelay_core::address::{parse_many, parse_one};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Uploaded file part
#[derive(Debug, Clone, Default)]
pub struct FormFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Raw multipart form, field names lowercased
#[derive(Debug, Clone, Default)]
pub struct InboundForm {
    fields: HashMap<String, Vec<u8>>,
    files: HashMap<String, FormFile>,
}

/// One entry of the `attachment-info` JSON object
#[derive(Debug, Default, Deserialize)]
struct AttachmentInfo {
    filename: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    content_type: Option<String>,
    #[serde(rename = "content-id")]
    content_id: Option<String>,
}

impl InboundForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Vec<u8>>) -> Self {
        self.fields.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_file(mut self, name: &str, file: FormFile) -> Self {
        self.files.insert(name.to_ascii_lowercase(), file);
        self
    }

    /// Drain an axum multipart body
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| Error::Parse(format!("Malformed multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| Error::Parse(format!("Failed to read form field '{}': {}", name, e)))?
                .to_vec();

            form = match file_name {
                Some(file_name) => form.with_file(
                    &name,
                    FormFile {
                        file_name: Some(file_name),
                        content_type,
                        data,
                    },
                ),
                None => form.with_field(&name, data),
            };
        }

        debug!(fields = form.fields.len(), files = form.files.len(), "Inbound form read");
        Ok(form)
    }

    /// Charset per field as declared in `charsets`
    fn charsets(&self) -> HashMap<String, String> {
        let Some(raw) = self.fields.get("charsets") else {
            return HashMap::new();
        };
        match serde_json::from_slice::<HashMap<String, String>>(raw) {
            Ok(charsets) => charsets
                .into_iter()
                .map(|(field, charset)| (field.to_ascii_lowercase(), charset))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed charsets field");
                HashMap::new()
            }
        }
    }

    fn text(&self, name: &str, charsets: &HashMap<String, String>) -> Option<String> {
        let raw = self.fields.get(name)?;
        Some(decode_charset(raw, charsets.get(name).map(String::as_str)))
    }

    fn attachments(&self) -> Result<Vec<Attachment>> {
        let Some(raw) = self.fields.get("attachment-info") else {
            return Ok(Vec::new());
        };
        let infos: BTreeMap<String, AttachmentInfo> = serde_json::from_slice(raw)
            .map_err(|e| Error::Parse(format!("Malformed attachment-info: {}", e)))?;

        let mut ordered: Vec<_> = infos.into_iter().collect();
        ordered.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

        let mut attachments = Vec::with_capacity(ordered.len());
        for (key, info) in ordered {
            let Some(file) = self.files.get(&key.to_ascii_lowercase()) else {
                warn!(attachment = %key, "attachment-info names a file that was not uploaded");
                continue;
            };

            attachments.push(Attachment {
                file_name: non_empty(info.filename)
                    .or_else(|| non_empty(file.file_name.clone()))
                    .or_else(|| non_empty(info.name))
                    .unwrap_or(key),
                content_type: non_empty(info.content_type)
                    .or_else(|| non_empty(file.content_type.clone()))
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                base64_data: STANDARD.encode(&file.data),
                content_id: non_empty(info.content_id),
            });
        }
        Ok(attachments)
    }

    /// Build the inbound message
    pub fn into_message(self) -> Result<InboundMessage> {
        let charsets = self.charsets();
        let field = |name: &str| self.text(name, &charsets);

        let mut message = InboundMessage {
            from: field("from").as_deref().and_then(parse_one).unwrap_or_default(),
            to: field("to").as_deref().map(parse_many).unwrap_or_default(),
            cc: field("cc").as_deref().map(parse_many).unwrap_or_default(),
            subject: field("subject").unwrap_or_default(),
            html: field("html"),
            text: field("text"),
            attachments: self.attachments()?,
            spf: field("spf"),
            dkim: field("dkim"),
            sender_ip: field("sender_ip"),
            spam_score: field("spam_score"),
            spam_report: field("spam_report"),
            charsets: field("charsets"),
        };

        if let Some(raw) = self.fields.get("email") {
            merge_raw_message(&mut message, raw)?;
        }

        Ok(message)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Decode a form value in the charset SendGrid declared for it
fn decode_charset(raw: &[u8], charset: Option<&str>) -> String {
    let charset = charset.map(str::trim).unwrap_or_default();
    if charset.is_empty()
        || charset.eq_ignore_ascii_case("utf-8")
        || charset.eq_ignore_ascii_case("utf8")
        || charset.eq_ignore_ascii_case("us-ascii")
    {
        return String::from_utf8_lossy(raw).into_owned();
    }

    // Let mail-parser's charset tables do the work on a one-part message
    let mut wrapped = format!(
        "Content-Type: text/plain; charset=\"{}\"\r\nContent-Transfer-Encoding: 8bit\r\n\r\n",
        charset
    )
    .into_bytes();
    wrapped.extend_from_slice(raw);

    MessageParser::default()
        .parse(&wrapped)
        .and_then(|parsed| parsed.body_text(0).map(|text| text.into_owned()))
        .unwrap_or_else(|| String::from_utf8_lossy(raw).into_owned())
}

fn addresses(address: Option<&mail_parser::Address<'_>>) -> Vec<EmailAddress> {
    let Some(address) = address else {
        return Vec::new();
    };
    let convert = |addr: &mail_parser::Addr<'_>| {
        addr.address().map(|email| {
            EmailAddress::new(addr.name().unwrap_or_default(), email.to_string())
        })
    };
    match address {
        mail_parser::Address::List(list) => list.iter().filter_map(&convert).collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| g.addresses.iter().filter_map(&convert))
            .collect(),
    }
}

/// Fill bodies, attachments and missing headers from a raw MIME message
fn merge_raw_message(message: &mut InboundMessage, raw: &[u8]) -> Result<()> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::Parse("Failed to parse raw email".to_string()))?;

    if message.from.email.is_empty() {
        if let Some(from) = addresses(parsed.from()).into_iter().next() {
            message.from = from;
        }
    }
    if message.to.is_empty() {
        message.to = addresses(parsed.to());
    }
    if message.cc.is_empty() {
        message.cc = addresses(parsed.cc());
    }
    if message.subject.is_empty() {
        message.subject = parsed.subject().unwrap_or_default().to_string();
    }
    if message.html.is_none() {
        message.html = parsed.body_html(0).map(|html| html.into_owned());
    }
    if message.text.is_none() {
        message.text = parsed.body_text(0).map(|text| text.into_owned());
    }

    if message.attachments.is_empty() {
        message.attachments = parsed
            .attachments()
            .map(|part| Attachment {
                file_name: part.attachment_name().unwrap_or("attachment").to_string(),
                content_type: part
                    .content_type()
                    .map(|ct| match ct.subtype() {
                        Some(sub) => format!("{}/{}", ct.ctype(), sub),
                        None => ct.ctype().to_string(),
                    })
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                base64_data: STANDARD.encode(part.contents()),
                content_id: part
                    .content_id()
                    .map(|id| id.trim_matches(|c| c == '<' || c == '>').to_string()),
            })
            .collect();
    }

    Ok(())
}
