//! Audit copies of inbound messages
//!
//! Every inbound message may be stored as one JSON document, grouped in
//! one folder per month and day:
//! `YYYY-MM/DD/HH-MM-SS_<from> - <subject>.json`.

use crate::file::FileStorage;
use chrono::{DateTime, Utc};
use mailrelay_common::types::InboundMessage;
use mailrelay_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Longest file name we generate, in bytes
const MAX_FILE_NAME_BYTES: usize = 200;

/// JSON document stored for each inbound message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub from: String,
    /// `;` separated
    pub to: String,
    /// `;` separated
    pub cc: String,
    pub subject: String,
    pub content: String,
    pub email: InboundMessage,
}

impl AuditRecord {
    pub fn from_message(message: &InboundMessage) -> Self {
        Self {
            from: message.from.email.clone(),
            to: join_emails(&message.to),
            cc: join_emails(&message.cc),
            subject: message.subject.clone(),
            content: message.body().to_string(),
            email: message.clone(),
        }
    }
}

fn join_emails(addresses: &[mailrelay_common::types::EmailAddress]) -> String {
    addresses
        .iter()
        .map(|a| a.email.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

/// Writes audit records to a [`FileStorage`]
pub struct AuditLog {
    storage: Arc<dyn FileStorage>,
}

impl AuditLog {
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self { storage }
    }

    /// Storage key for a message received at `at`
    pub fn key_for(message: &InboundMessage, at: DateTime<Utc>) -> String {
        let name = format!(
            "{}_{} - {}",
            at.format("%H-%M-%S"),
            message.from.email,
            message.subject
        );
        format!(
            "{}/{}.json",
            at.format("%Y-%m/%d"),
            truncate_bytes(&sanitize_file_name(&name), MAX_FILE_NAME_BYTES)
        )
    }

    /// Store a record for `message` and return its key
    pub async fn record(&self, message: &InboundMessage) -> Result<String> {
        self.record_at(message, Utc::now()).await
    }

    pub async fn record_at(&self, message: &InboundMessage, at: DateTime<Utc>) -> Result<String> {
        let key = Self::key_for(message, at);
        let payload = serde_json::to_vec_pretty(&AuditRecord::from_message(message))
            .map_err(|e| Error::Storage(format!("Failed to serialize audit record: {}", e)))?;

        let key = self.storage.store(&key, &payload).await?;
        debug!(key = %key, "Audit record stored");
        Ok(key)
    }
}

/// Path separators and control characters become `_`
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn truncate_bytes(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
