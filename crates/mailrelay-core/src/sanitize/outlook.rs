//! Outlook web and desktop clients
//!
//! A reply quotes the previous message as:
//!
//! ```text
//! From: me@domain.com <me@domain.com>
//! Sent: Tuesday, September 3, 2019 11:19:42 PM
//! To: me@live.com <me@live.com>
//! Subject: RE: Relay for ext@user.foo: Test
//! ```
//!
//! The gateway never resolves contacts, so addresses always appear either
//! bare or as `email <email>`.

use super::{
    escape_html, has_domain_suffix, has_quoted_headers, replace_spans, MetadataSanitizer,
    SanitizeOutcome,
};
use crate::subject::SubjectTag;
use regex::{Captures, Regex};
use tracing::{debug, warn};

const OUTLOOK_DOMAINS: &[&str] = &["@live.com", "@outlook.com", "@hotmail.com"];

/// A real line break, or the escaped `\r\n` some gateways leave in HTML
const LINE_BREAK: &str = r"(?:\r?\n|\\r\\n)";

/// Sanitizer for mail written with Outlook
#[derive(Debug, Clone)]
pub struct OutlookWebSanitizer {
    token: String,
}

impl OutlookWebSanitizer {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.trim().to_string(),
        }
    }

    /// Pattern for the subject line's tag, with the prefix optional since
    /// the quoted subject usually predates the latest `RE:`
    fn subject_pattern(&self, tag: &SubjectTag) -> String {
        let prefix = if tag.prefix.is_empty() {
            String::new()
        } else {
            format!("(?:{})?", regex::escape(&tag.prefix))
        };
        format!(
            r"{}(?P<subject>{}\s?{}:[ \t]*)",
            prefix,
            regex::escape(&self.token),
            regex::escape(tag.target().unwrap_or_default())
        )
    }

    fn plain_text_pattern(&self, tag: &SubjectTag, relay_target_email: &str, to: &str) -> String {
        let to = regex::escape(to);
        let rt = regex::escape(relay_target_email);
        format!(
            r"From:.*?(?P<from>{to} <{to}>|{to}){nl}Sent: .*?{nl}To: (?P<to>{rt} <{rt}>|{rt}){nl}Subject: {subject}",
            to = to,
            rt = rt,
            nl = LINE_BREAK,
            subject = self.subject_pattern(tag),
        )
    }

    fn html_pattern(&self, tag: &SubjectTag, relay_target_email: &str, to: &str) -> String {
        let to = regex::escape(to);
        let rt = regex::escape(relay_target_email);
        format!(
            concat!(
                r"From:.*?(?P<from>{to} &lt;{to}&gt;|{to}).*?{nl}",
                r".*?Sent:.*?{nl}",
                r".*?To:.*?(?P<to>{rt} &lt;{rt}&gt;|{rt}).*?{nl}",
                r".*?Subject:.*?{subject}",
            ),
            to = to,
            rt = rt,
            nl = LINE_BREAK,
            subject = self.subject_pattern(tag),
        )
    }

    fn rewrite(
        &self,
        pattern: &str,
        content: &str,
        from_replacement: String,
        to_replacement: String,
    ) -> SanitizeOutcome {
        let regex = match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(error = %e, "Failed to build quoted header pattern");
                None
            }
        };

        let Some(captures) = regex.as_ref().and_then(|r| r.captures(content)) else {
            if has_quoted_headers(content) {
                debug!(sanitizer = self.name(), "Quoted headers did not match the expected shape");
                return SanitizeOutcome::FormatDrift(content.to_string());
            }
            return SanitizeOutcome::NoQuotedHeaders(content.to_string());
        };

        let spans = [
            ("from", from_replacement),
            ("to", to_replacement),
            ("subject", String::new()),
        ]
        .into_iter()
        .filter_map(|(group, replacement)| span(&captures, group).map(|range| (range, replacement)))
        .collect();

        SanitizeOutcome::Rewritten(replace_spans(content, spans))
    }
}

fn span(captures: &Captures<'_>, group: &str) -> Option<std::ops::Range<usize>> {
    captures.name(group).map(|m| m.range())
}

impl MetadataSanitizer for OutlookWebSanitizer {
    fn name(&self) -> &'static str {
        "outlook-web"
    }

    fn can_sanitize(&self, email: &str) -> bool {
        has_domain_suffix(email, OUTLOOK_DOMAINS)
    }

    fn sanitize_plain_text(
        &self,
        content: &str,
        tag: &SubjectTag,
        relay_target_email: &str,
        to: &str,
    ) -> SanitizeOutcome {
        let target = tag.target().unwrap_or_default();
        self.rewrite(
            &self.plain_text_pattern(tag, relay_target_email, to),
            content,
            format!("{} <{}>", target, target),
            format!("{} <{}>", to, to),
        )
    }

    fn sanitize_html(
        &self,
        content: &str,
        tag: &SubjectTag,
        relay_target_email: &str,
        to: &str,
    ) -> SanitizeOutcome {
        let target = escape_html(tag.target().unwrap_or_default());
        let to_escaped = escape_html(to);
        self.rewrite(
            &self.html_pattern(tag, relay_target_email, to),
            content,
            format!("{} &lt;{}&gt;", target, target),
            format!("{} &lt;{}&gt;", to_escaped, to_escaped),
        )
    }
}
