//! Subject relay tag parsing
//!
//! The owner addresses an external recipient by writing
//! `Relay for <email>: <subject>` into the subject line. Mail clients add
//! reply markers in front (`RE: FWD: ...`) and long conversations repeat
//! the tag, so the parser keeps the leading markers as a prefix and
//! collapses nested tags into the outermost one.

use mailrelay_common::config::default_subject_tag;
use mailrelay_common::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Result of parsing a subject line
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubjectTag {
    /// Reply/forward markers in front of the tag, kept verbatim
    pub prefix: String,
    /// Recipient named by the tag, empty for `Relay for : ...`
    pub relay_target: Option<String>,
    /// Subject with every tag removed
    pub subject: String,
}

impl SubjectTag {
    fn untagged(subject: &str) -> Self {
        Self {
            prefix: String::new(),
            relay_target: None,
            subject: subject.to_string(),
        }
    }

    /// Target of the tag, if a non-empty one was present
    pub fn target(&self) -> Option<&str> {
        self.relay_target.as_deref().filter(|t| !t.is_empty())
    }
}

/// Parses `<prefix><token> <target>: <subject>` subject lines
#[derive(Debug, Clone)]
pub struct SubjectParser {
    token: String,
    pattern: Regex,
}

impl SubjectParser {
    /// Create a parser for `token`; a blank token falls back to `Relay for`
    pub fn new(token: &str) -> Result<Self> {
        let token = match token.trim() {
            "" => default_subject_tag(),
            t => t.to_string(),
        };
        let pattern = Regex::new(&format!(
            r"(?s)^(?P<prefix>.*?){} (?P<target>[^:\s]*?):(?P<rest>.*)$",
            regex::escape(&token)
        ))
        .map_err(|e| Error::Config(format!("Invalid subject tag '{}': {}", token, e)))?;

        Ok(Self { token, pattern })
    }

    /// The tag token, e.g. `Relay for`
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Render the tag that precedes a subject, e.g. `Relay for ext@user.foo: `
    pub fn format_tag(&self, target: &str) -> String {
        format!("{} {}: ", self.token, target)
    }

    pub fn parse(&self, subject: &str) -> SubjectTag {
        let Some(captures) = self.pattern.captures(subject) else {
            return SubjectTag::untagged(subject);
        };

        // Strip inner tags until none is left; joining a prefix to the
        // remainder may itself spell out a new tag.
        let mut subject = captures["rest"].trim().to_string();
        while let Some(inner) = self.pattern.captures(&subject) {
            subject = format!("{}{}", &inner["prefix"], inner["rest"].trim());
        }

        SubjectTag {
            prefix: captures["prefix"].to_string(),
            relay_target: Some(captures["target"].to_string()),
            subject,
        }
    }
}
