//! Reply-chain metadata sanitizers
//!
//! When the owner replies from the private mailbox, the mail client quotes
//! the previous headers into the body. Those quoted headers contain the
//! private address and the tagged subject. A sanitizer rewrites them for
//! one family of mail clients, selected by the private address's domain.

mod outlook;

pub use outlook::OutlookWebSanitizer;

use crate::subject::SubjectTag;
use std::ops::Range;

/// Body flavour handed to a sanitizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Html,
    PlainText,
}

impl std::fmt::Display for BodyFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyFormat::Html => f.write_str("html"),
            BodyFormat::PlainText => f.write_str("plain text"),
        }
    }
}

/// Result of a sanitization attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizeOutcome {
    /// Quoted headers found and rewritten
    Rewritten(String),
    /// No quoted header block, content unchanged
    NoQuotedHeaders(String),
    /// A header block exists but does not have the expected shape; content unchanged
    FormatDrift(String),
}

impl SanitizeOutcome {
    /// Whether the content may be sent to the external party
    pub fn is_ok(&self) -> bool {
        !matches!(self, SanitizeOutcome::FormatDrift(_))
    }

    pub fn content(&self) -> &str {
        match self {
            SanitizeOutcome::Rewritten(c)
            | SanitizeOutcome::NoQuotedHeaders(c)
            | SanitizeOutcome::FormatDrift(c) => c,
        }
    }

    pub fn into_content(self) -> String {
        match self {
            SanitizeOutcome::Rewritten(c)
            | SanitizeOutcome::NoQuotedHeaders(c)
            | SanitizeOutcome::FormatDrift(c) => c,
        }
    }
}

/// Sanitizer for the quoted headers written by one family of mail clients
pub trait MetadataSanitizer: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether mail sent from `email` is written by a client this sanitizer knows
    fn can_sanitize(&self, email: &str) -> bool;

    fn sanitize_plain_text(
        &self,
        content: &str,
        tag: &SubjectTag,
        relay_target_email: &str,
        to: &str,
    ) -> SanitizeOutcome;

    fn sanitize_html(
        &self,
        content: &str,
        tag: &SubjectTag,
        relay_target_email: &str,
        to: &str,
    ) -> SanitizeOutcome;

    fn sanitize(
        &self,
        format: BodyFormat,
        content: &str,
        tag: &SubjectTag,
        relay_target_email: &str,
        to: &str,
    ) -> SanitizeOutcome {
        match format {
            BodyFormat::Html => self.sanitize_html(content, tag, relay_target_email, to),
            BodyFormat::PlainText => self.sanitize_plain_text(content, tag, relay_target_email, to),
        }
    }
}

/// Registered sanitizers, searched in order
#[derive(Default)]
pub struct SanitizerSet {
    sanitizers: Vec<Box<dyn MetadataSanitizer>>,
}

impl SanitizerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in sanitizer for the given subject tag token
    pub fn builtin(token: &str) -> Self {
        Self::new().with(OutlookWebSanitizer::new(token))
    }

    pub fn with(mut self, sanitizer: impl MetadataSanitizer + 'static) -> Self {
        self.sanitizers.push(Box::new(sanitizer));
        self
    }

    /// First sanitizer that handles mail from `email`
    pub fn select(&self, email: &str) -> Option<&dyn MetadataSanitizer> {
        self.sanitizers
            .iter()
            .find(|s| s.can_sanitize(email))
            .map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.sanitizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sanitizers.is_empty()
    }
}

/// All four quoted header labels appear somewhere in `content`
pub(crate) fn has_quoted_headers(content: &str) -> bool {
    ["From:", "Sent:", "To:", "Subject:"]
        .iter()
        .all(|keyword| content.contains(keyword))
}

/// Apply non-overlapping replacements, last span first so earlier offsets stay valid
pub(crate) fn replace_spans(content: &str, mut spans: Vec<(Range<usize>, String)>) -> String {
    spans.sort_by(|a, b| b.0.start.cmp(&a.0.start));

    let mut rewritten = content.to_string();
    for (range, replacement) in spans {
        rewritten.replace_range(range, &replacement);
    }
    rewritten
}

pub(crate) fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Case-insensitive domain suffix match
pub(crate) fn has_domain_suffix(email: &str, domains: &[&str]) -> bool {
    let email = email.to_ascii_lowercase();
    domains.iter().any(|domain| email.ends_with(domain))
}
