//! Common types for mailrelay

use serde::{Deserialize, Serialize};

/// Email address with an optional display name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name, may be empty
    #[serde(default)]
    pub name: String,
    /// Address identity
    pub email: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Create an address without a display name
    pub fn bare(email: impl Into<String>) -> Self {
        Self::new(String::new(), email)
    }

    /// Domain part including the leading `@`, if any
    pub fn domain(&self) -> Option<&str> {
        self.email.find('@').map(|pos| &self.email[pos..])
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.email)
        } else {
            write!(f, "\"{}\" <{}>", self.name, self.email)
        }
    }
}

/// Attachment carried through the relay unchanged
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    /// Base64 encoded content
    pub base64_data: String,
    /// Content id for inline parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
}

/// Message received from the inbound gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    pub from: EmailAddress,
    #[serde(default)]
    pub to: Vec<EmailAddress>,
    #[serde(default)]
    pub cc: Vec<EmailAddress>,
    #[serde(default)]
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// SPF verdict reported by the gateway
    pub spf: Option<String>,
    /// DKIM verdict reported by the gateway, e.g. `{@example.com : pass}`
    pub dkim: Option<String>,
    pub sender_ip: Option<String>,
    pub spam_score: Option<String>,
    pub spam_report: Option<String>,
    /// Raw charsets JSON as sent by the gateway
    pub charsets: Option<String>,
}

impl InboundMessage {
    /// HTML body when present, otherwise the plain text body
    pub fn body(&self) -> &str {
        match (&self.html, &self.text) {
            (Some(html), _) if !html.is_empty() => html,
            (_, Some(text)) => text,
            (Some(html), None) => html,
            (None, None) => "",
        }
    }

    /// Every recipient of To followed by Cc, duplicates removed, order kept
    pub fn recipients(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for address in self.to.iter().chain(self.cc.iter()) {
            if !seen.contains(&address.email.as_str()) {
                seen.push(address.email.as_str());
            }
        }
        seen
    }
}

/// Message handed to a dispatcher; always exactly one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    /// HTML or plain text content
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}
