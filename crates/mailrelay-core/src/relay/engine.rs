//! Relay decision engine
//!
//! Maps one inbound message to exactly one outbound message:
//!
//! 1. untagged subject: forward to the owner
//! 2. tagged, domain sending disabled: warn the owner
//! 3. tagged, sender not verified as the owner: warn the owner
//! 4. tagged with an undeliverable target: warn the owner
//! 5. tagged, no sanitizer or sanitization failed: warn the owner
//! 6. otherwise: send as the domain to the tag's target

use crate::auth::{authorize, AuthResult};
use crate::sanitize::{escape_html, BodyFormat, SanitizerSet};
use crate::subject::{SubjectParser, SubjectTag};
use lettre::Address;
use mailrelay_common::config::{RelayConfig, SpoofWarningSender};
use mailrelay_common::types::{InboundMessage, OutboundMessage};
use mailrelay_common::{Error, Result};

/// Placeholder used when spoofing senders are redacted
const REDACTED_SENDER: &str = "[redacted]";

/// Relay settings for one domain
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Private mailbox owning the domain
    pub relay_target_email: String,
    /// Public domain, normalized to start with `@`
    pub domain: String,
    pub send_as_domain: bool,
    pub spoof_warning_sender: SpoofWarningSender,
}

impl RelaySettings {
    pub fn new(relay_target_email: impl Into<String>, domain: &str, send_as_domain: bool) -> Self {
        Self {
            relay_target_email: relay_target_email.into(),
            domain: normalize_domain(domain),
            send_as_domain,
            spoof_warning_sender: SpoofWarningSender::default(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let target = config
            .target_email
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Config("relay.target_email is not set".to_string()))?;
        let domain = config
            .domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| Error::Config("relay.domain is not set".to_string()))?;

        Ok(Self {
            spoof_warning_sender: config.spoof_warning_sender,
            ..Self::new(target, domain, config.send_as_domain)
        })
    }
}

/// `example.com` and `@example.com` both become `@example.com`
pub fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim();
    if domain.starts_with('@') {
        domain.to_string()
    } else {
        format!("@{}", domain)
    }
}

/// Why sanitized content could not be produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeFailure {
    /// No sanitizer knows the owner's mail client
    NoSanitizer,
    /// Quoted headers exist but did not have the expected shape
    FormatDrift(BodyFormat),
}

/// Decision for one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    ForwardToOwner(OutboundMessage),
    SendAsDomain(OutboundMessage),
    WarnDisabled(OutboundMessage),
    WarnInvalidTarget(OutboundMessage),
    WarnSpoofed {
        auth: AuthResult,
        message: OutboundMessage,
    },
    WarnSanitizeFailed {
        reason: SanitizeFailure,
        message: OutboundMessage,
    },
}

impl RelayOutcome {
    pub fn message(&self) -> &OutboundMessage {
        match self {
            RelayOutcome::ForwardToOwner(message)
            | RelayOutcome::SendAsDomain(message)
            | RelayOutcome::WarnDisabled(message)
            | RelayOutcome::WarnInvalidTarget(message)
            | RelayOutcome::WarnSpoofed { message, .. }
            | RelayOutcome::WarnSanitizeFailed { message, .. } => message,
        }
    }

    pub fn into_message(self) -> OutboundMessage {
        match self {
            RelayOutcome::ForwardToOwner(message)
            | RelayOutcome::SendAsDomain(message)
            | RelayOutcome::WarnDisabled(message)
            | RelayOutcome::WarnInvalidTarget(message)
            | RelayOutcome::WarnSpoofed { message, .. }
            | RelayOutcome::WarnSanitizeFailed { message, .. } => message,
        }
    }

    /// Stable name for logs and API responses
    pub fn kind(&self) -> &'static str {
        match self {
            RelayOutcome::ForwardToOwner(_) => "forward_to_owner",
            RelayOutcome::SendAsDomain(_) => "send_as_domain",
            RelayOutcome::WarnDisabled(_) => "warn_disabled",
            RelayOutcome::WarnInvalidTarget(_) => "warn_invalid_target",
            RelayOutcome::WarnSpoofed { .. } => "warn_spoofed",
            RelayOutcome::WarnSanitizeFailed { .. } => "warn_sanitize_failed",
        }
    }

    pub fn is_warning(&self) -> bool {
        !matches!(
            self,
            RelayOutcome::ForwardToOwner(_) | RelayOutcome::SendAsDomain(_)
        )
    }
}

/// Stateless relay decision engine, safe to share between requests
pub struct RelayEngine {
    settings: RelaySettings,
    parser: SubjectParser,
    sanitizers: SanitizerSet,
}

impl RelayEngine {
    pub fn new(settings: RelaySettings, parser: SubjectParser, sanitizers: SanitizerSet) -> Self {
        Self {
            settings,
            parser,
            sanitizers,
        }
    }

    /// Engine with the built-in sanitizers
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let parser = SubjectParser::new(&config.subject_tag)?;
        let sanitizers = SanitizerSet::builtin(parser.token());
        Ok(Self::new(RelaySettings::from_config(config)?, parser, sanitizers))
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn decide(&self, message: &InboundMessage) -> RelayOutcome {
        let owner = self.settings.relay_target_email.as_str();
        let from = message.from.email.as_str();
        let to = self.domain_recipient(message);
        let tag = self.parser.parse(&message.subject);

        let Some(target) = tag.target() else {
            let subject = format!(
                "{}{}{}",
                tag.prefix,
                self.parser.format_tag(from),
                tag.subject
            );
            return RelayOutcome::ForwardToOwner(outbound(&to, owner, subject, message.body().to_string(), message));
        };

        if !self.settings.send_as_domain {
            let body = format!(
                "Sending as domain is disabled! Set 'relay.send_as_domain = true' to enable it. Original message:<br/>{}",
                message.body()
            );
            return RelayOutcome::WarnDisabled(outbound(
                &to,
                owner,
                format!("[WARNING] {}", message.subject),
                body,
                message,
            ));
        }

        let auth = authorize(from, owner, message.spf.as_deref(), message.dkim.as_deref());
        if !auth.is_authorized() {
            return RelayOutcome::WarnSpoofed {
                auth,
                message: outbound(
                    &to,
                    owner,
                    format!("[SPOOFWARNING] {}", message.subject),
                    self.spoof_warning_body(message, target, auth),
                    message,
                ),
            };
        }

        if target.parse::<Address>().is_err() {
            let body = format!(
                "Could not send as the domain: '{}' is not a valid email address. Original message:<br/>{}",
                escape_html(target),
                message.body()
            );
            return RelayOutcome::WarnInvalidTarget(outbound(
                &to,
                owner,
                format!("[WARNING] {}", message.subject),
                body,
                message,
            ));
        }

        let Some(sanitizer) = self.sanitizers.select(owner) else {
            let body = format!(
                "Failed to sanitize the email content (and did not send it to the target). <br />Could not find a sanitizer for domain {}. Original content:<br /><br />{}",
                escape_html(owner),
                message.body()
            );
            return RelayOutcome::WarnSanitizeFailed {
                reason: SanitizeFailure::NoSanitizer,
                message: outbound(&to, owner, format!("[SANITIZE] {}", message.subject), body, message),
            };
        };

        let (format, content) = match message.html.as_deref() {
            Some(html) if !html.is_empty() => (BodyFormat::Html, html),
            _ => (BodyFormat::PlainText, message.text.as_deref().unwrap_or_default()),
        };

        let outcome = sanitizer.sanitize(format, content, &tag, owner, &to);
        if !outcome.is_ok() {
            let body = format!(
                "Failed to sanitize the email ({}) content (and did not send it to the target). <br />Could not find the section with private information. Assuming the format changed. Original content below.<br /><br />{}",
                format,
                outcome.into_content()
            );
            return RelayOutcome::WarnSanitizeFailed {
                reason: SanitizeFailure::FormatDrift(format),
                message: outbound(&to, owner, format!("[SANITIZE] {}", message.subject), body, message),
            };
        }

        RelayOutcome::SendAsDomain(outbound(
            &to,
            target,
            domain_subject(&tag),
            outcome.into_content(),
            message,
        ))
    }

    /// First To/Cc address on the domain, `unknown@<domain>` when we were BCC'd
    fn domain_recipient(&self, message: &InboundMessage) -> String {
        let domain = self.settings.domain.to_ascii_lowercase();
        message
            .recipients()
            .into_iter()
            .find(|email| email.to_ascii_lowercase().ends_with(&domain))
            .map(str::to_string)
            .unwrap_or_else(|| format!("unknown{}", self.settings.domain))
    }

    fn spoof_warning_body(&self, message: &InboundMessage, target: &str, auth: AuthResult) -> String {
        let sender = match self.settings.spoof_warning_sender {
            SpoofWarningSender::Literal => escape_html(&message.from.email),
            SpoofWarningSender::Redacted => REDACTED_SENDER.to_string(),
        };
        format!(
            "Someone tried to send an email in the name of the domain by using the '{}' subject. Their email was: {}. <br />Auth result was {} (SPF: {}, DKIM: {}). Original message below.<br /><br />{}",
            escape_html(&format!("{} {}", self.parser.token(), target)),
            sender,
            auth,
            escape_html(message.spf.as_deref().unwrap_or("none")),
            escape_html(message.dkim.as_deref().unwrap_or("none")),
            message.body()
        )
    }
}

fn domain_subject(tag: &SubjectTag) -> String {
    format!("{}{}", tag.prefix, tag.subject)
}

fn outbound(from: &str, to: &str, subject: String, body: String, message: &InboundMessage) -> OutboundMessage {
    OutboundMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject,
        body,
        attachments: message.attachments.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::{MetadataSanitizer, SanitizeOutcome};
    use mailrelay_common::types::{Attachment, EmailAddress};
    use pretty_assertions::assert_eq;

    const OWNER: &str = "me@priv.example.com";

    /// Accepts everything and leaves content unchanged
    struct PassthroughSanitizer;

    impl MetadataSanitizer for PassthroughSanitizer {
        fn name(&self) -> &'static str {
            "passthrough"
        }

        fn can_sanitize(&self, _: &str) -> bool {
            true
        }

        fn sanitize_plain_text(&self, content: &str, _: &SubjectTag, _: &str, _: &str) -> SanitizeOutcome {
            SanitizeOutcome::NoQuotedHeaders(content.to_string())
        }

        fn sanitize_html(&self, content: &str, _: &SubjectTag, _: &str, _: &str) -> SanitizeOutcome {
            SanitizeOutcome::NoQuotedHeaders(content.to_string())
        }
    }

    fn engine(owner: &str, send_as_domain: bool, sanitizers: SanitizerSet) -> RelayEngine {
        RelayEngine::new(
            RelaySettings::new(owner, "domain.com", send_as_domain),
            SubjectParser::new("Relay for").unwrap(),
            sanitizers,
        )
    }

    fn passthrough(owner: &str) -> RelayEngine {
        engine(owner, true, SanitizerSet::new().with(PassthroughSanitizer))
    }

    fn inbound(from: &str, subject: &str) -> InboundMessage {
        InboundMessage {
            from: EmailAddress::bare(from),
            to: vec![EmailAddress::bare("me@domain.com")],
            subject: subject.to_string(),
            html: Some("Foo".to_string()),
            ..Default::default()
        }
    }

    fn owner_message(subject: &str) -> InboundMessage {
        InboundMessage {
            spf: Some("pass".to_string()),
            dkim: Some("{@priv.example.com : pass}".to_string()),
            ..inbound(OWNER, subject)
        }
    }

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("domain.com"), "@domain.com");
        assert_eq!(normalize_domain("@domain.com"), "@domain.com");
        assert_eq!(normalize_domain(" domain.com "), "@domain.com");
    }

    #[test]
    fn test_settings_from_config() {
        let config = RelayConfig {
            target_email: Some(OWNER.to_string()),
            domain: Some("domain.com".to_string()),
            send_as_domain: true,
            spoof_warning_sender: SpoofWarningSender::Redacted,
            ..Default::default()
        };
        let settings = RelaySettings::from_config(&config).unwrap();
        assert_eq!(settings.domain, "@domain.com");
        assert_eq!(settings.spoof_warning_sender, SpoofWarningSender::Redacted);

        let missing = RelayConfig::default();
        assert!(matches!(RelaySettings::from_config(&missing), Err(Error::Config(_))));
    }

    #[test]
    fn test_external_mail_forwarded_to_owner() {
        let outcome = passthrough(OWNER).decide(&inbound("ext@user.foo", "Inquiry"));
        assert_eq!(
            outcome,
            RelayOutcome::ForwardToOwner(OutboundMessage {
                from: "me@domain.com".to_string(),
                to: OWNER.to_string(),
                subject: "Relay for ext@user.foo: Inquiry".to_string(),
                body: "Foo".to_string(),
                attachments: vec![],
            })
        );
        assert!(!outcome.is_warning());
    }

    #[test]
    fn test_owner_without_tag_is_forwarded_back() {
        let outcome = passthrough(OWNER).decide(&inbound(OWNER, "Inquiry"));
        assert_eq!(outcome.kind(), "forward_to_owner");
        assert_eq!(outcome.message().subject, "Relay for me@priv.example.com: Inquiry");
        assert_eq!(outcome.message().to, OWNER);
    }

    #[test]
    fn test_owner_sends_as_domain() {
        let mut message = owner_message("Relay for ext@user.foo: Inquiry");
        message.html = None;
        message.text = Some("Foo".to_string());

        let outcome = passthrough(OWNER).decide(&message);
        assert_eq!(
            outcome,
            RelayOutcome::SendAsDomain(OutboundMessage {
                from: "me@domain.com".to_string(),
                to: "ext@user.foo".to_string(),
                subject: "Inquiry".to_string(),
                body: "Foo".to_string(),
                attachments: vec![],
            })
        );
    }

    #[test]
    fn test_send_as_domain_keeps_reply_prefix() {
        let outcome = passthrough(OWNER).decide(&owner_message("RE: Relay for ext@user.foo: Relay for me@domain.com: Inquiry"));
        assert_eq!(outcome.kind(), "send_as_domain");
        assert_eq!(outcome.message().subject, "RE: Inquiry");
        assert_eq!(outcome.message().to, "ext@user.foo");
    }

    #[test]
    fn test_spf_failure_warns_owner() {
        let mut message = owner_message("Relay for ext@user.foo: Inquiry");
        message.spf = Some("fail".to_string());

        let outcome = passthrough(OWNER).decide(&message);
        let RelayOutcome::WarnSpoofed { auth, message: warning } = &outcome else {
            panic!("expected spoof warning, got {:?}", outcome);
        };
        assert_eq!(*auth, AuthResult::SpfFail);
        assert_eq!(warning.subject, "[SPOOFWARNING] Relay for ext@user.foo: Inquiry");
        assert_eq!(warning.to, OWNER);
        assert_eq!(warning.from, "me@domain.com");
        assert!(warning.body.contains("Auth result was SpfFail (SPF: fail, DKIM: {@priv.example.com : pass})"));
        assert!(warning.body.contains("Their email was: me@priv.example.com."));
        assert!(warning.body.ends_with("Foo"));
        assert!(outcome.is_warning());
    }

    #[test]
    fn test_external_spoof_attempt() {
        let outcome = passthrough(OWNER).decide(&inbound("evil@attacker.test", "Relay for victim@user.foo: Hi"));
        let RelayOutcome::WarnSpoofed { auth, message } = outcome else {
            panic!("expected spoof warning");
        };
        assert_eq!(auth, AuthResult::InvalidSender);
        assert_eq!(message.to, OWNER);
        assert!(message.body.contains("'Relay for victim@user.foo' subject"));
        assert!(message.body.contains("SPF: none, DKIM: none"));
    }

    #[test]
    fn test_spoof_warning_sender_redacted() {
        let mut engine = passthrough(OWNER);
        engine.settings.spoof_warning_sender = SpoofWarningSender::Redacted;

        let outcome = engine.decide(&inbound("evil@attacker.test", "Relay for victim@user.foo: Hi"));
        assert_eq!(outcome.kind(), "warn_spoofed");
        assert!(!outcome.message().body.contains("evil@attacker.test"));
        assert!(outcome.message().body.contains("Their email was: [redacted]."));
    }

    #[test]
    fn test_disabled_domain_sending_warns_owner() {
        let engine = engine(OWNER, false, SanitizerSet::new().with(PassthroughSanitizer));
        let outcome = engine.decide(&owner_message("Relay for ext@user.foo: Inquiry"));
        assert_eq!(outcome.kind(), "warn_disabled");
        assert_eq!(outcome.message().subject, "[WARNING] Relay for ext@user.foo: Inquiry");
        assert_eq!(outcome.message().to, OWNER);
        assert!(outcome.message().body.ends_with("Original message:<br/>Foo"));
    }

    #[test]
    fn test_empty_tag_target_forwards_to_owner() {
        let engine = passthrough(OWNER);
        let outcome = engine.decide(&inbound("ext@user.foo", "Relay for : Test"));
        assert_eq!(outcome.kind(), "forward_to_owner");
        assert_eq!(outcome.message().subject, "Relay for ext@user.foo: Test");

        let outcome = engine.decide(&owner_message("Relay for : Relay for ext@user.foo: Test"));
        assert_eq!(outcome.kind(), "forward_to_owner");
        assert_eq!(outcome.message().to, OWNER);
        assert_eq!(outcome.message().subject, "Relay for me@priv.example.com: Test");
    }

    #[test]
    fn test_invalid_tag_target_warns_owner() {
        let outcome = passthrough(OWNER).decide(&owner_message("RE: Relay for bob: hi"));
        assert_eq!(outcome.kind(), "warn_invalid_target");
        assert!(outcome.is_warning());
        assert_eq!(outcome.message().to, OWNER);
        assert_eq!(outcome.message().subject, "[WARNING] RE: Relay for bob: hi");
        assert!(outcome.message().body.contains("'bob' is not a valid email address"));
        assert!(outcome.message().body.ends_with("Original message:<br/>Foo"));
    }

    #[test]
    fn test_invalid_tag_target_from_stranger_is_spoof() {
        let outcome = passthrough(OWNER).decide(&inbound("ext@user.foo", "Relay for bob: hi"));
        assert_eq!(outcome.kind(), "warn_spoofed");
    }

    #[test]
    fn test_missing_sanitizer_warns_owner() {
        let engine = engine(OWNER, true, SanitizerSet::builtin("Relay for"));
        let outcome = engine.decide(&owner_message("Relay for ext@user.foo: Inquiry"));
        let RelayOutcome::WarnSanitizeFailed { reason, message } = outcome else {
            panic!("expected sanitize warning");
        };
        assert_eq!(reason, SanitizeFailure::NoSanitizer);
        assert_eq!(message.subject, "[SANITIZE] Relay for ext@user.foo: Inquiry");
        assert_eq!(message.to, OWNER);
        assert!(message.body.contains("Could not find a sanitizer for domain me@priv.example.com"));
    }

    fn outlook_reply(token: &str) -> InboundMessage {
        InboundMessage {
            from: EmailAddress::bare("me@live.com"),
            to: vec![EmailAddress::bare("me@domain.com")],
            subject: format!("{} ext@user.foo: Test", token),
            text: Some(format!(
                "This is my response\n___________________________________________\nFrom: me@domain.com <me@domain.com>\nSent: Tuesday, September 3, 2019 11:19:42 PM\nTo: me@live.com <me@live.com>\nSubject: {} ext@user.foo: Test\nThis is the original message from someone",
                token
            )),
            spf: Some("pass".to_string()),
            dkim: Some("{@live.com : pass}".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_outlook_reply_is_sanitized() {
        let parser = SubjectParser::new("Relay for").unwrap();
        let engine = RelayEngine::new(
            RelaySettings::new("me@live.com", "domain.com", true),
            parser,
            SanitizerSet::builtin("Relay for"),
        );

        let outcome = engine.decide(&outlook_reply("Relay for"));
        assert_eq!(outcome.kind(), "send_as_domain");
        let body = &outcome.message().body;
        assert!(!body.contains("me@live.com"));
        assert!(body.contains("From: ext@user.foo <ext@user.foo>"));
        assert!(body.contains("To: me@domain.com <me@domain.com>"));
        assert!(body.contains("Subject: Test"));
        assert_eq!(outcome.message().subject, "Test");
    }

    #[test]
    fn test_outlook_reply_with_custom_token() {
        let config = RelayConfig {
            target_email: Some("me@live.com".to_string()),
            domain: Some("domain.com".to_string()),
            send_as_domain: true,
            subject_tag: "Email Relay:".to_string(),
            ..Default::default()
        };
        let engine = RelayEngine::from_config(&config).unwrap();

        let outcome = engine.decide(&outlook_reply("Email Relay:"));
        assert_eq!(outcome.kind(), "send_as_domain");
        assert_eq!(outcome.message().to, "ext@user.foo");
        assert!(!outcome.message().body.contains("Email Relay: ext@user.foo"));
    }

    #[test]
    fn test_outlook_format_drift_warns_owner() {
        let engine = RelayEngine::new(
            RelaySettings::new("me@live.com", "domain.com", true),
            SubjectParser::new("Relay for").unwrap(),
            SanitizerSet::builtin("Relay for"),
        );
        let mut message = outlook_reply("Relay for");
        message.text = message
            .text
            .map(|t| t.replace("Sent:", "an extra line\nSent:"));

        let outcome = engine.decide(&message);
        let RelayOutcome::WarnSanitizeFailed { reason, message: warning } = outcome else {
            panic!("expected sanitize warning");
        };
        assert_eq!(reason, SanitizeFailure::FormatDrift(BodyFormat::PlainText));
        assert_eq!(warning.to, "me@live.com");
        assert!(warning.body.contains("(plain text) content"));
        assert!(warning.body.contains("To: me@live.com <me@live.com>"));
    }

    #[test]
    fn test_recipient_selection() {
        let engine = passthrough(OWNER);
        let mut message = inbound("ext@user.foo", "Inquiry");
        message.to = vec![
            EmailAddress::bare("someone@else.com"),
            EmailAddress::bare("Other@Domain.com"),
        ];
        message.cc = vec![EmailAddress::bare("me@domain.com")];
        assert_eq!(engine.decide(&message).message().from, "Other@Domain.com");

        message.to = vec![EmailAddress::bare("someone@sub.notdomain.com")];
        message.cc = vec![];
        assert_eq!(engine.decide(&message).message().from, "unknown@domain.com");
    }

    #[test]
    fn test_cc_recipient_on_domain() {
        let engine = passthrough(OWNER);
        let mut message = inbound("ext@user.foo", "Inquiry");
        message.to = vec![EmailAddress::bare("friend@user.foo")];
        message.cc = vec![EmailAddress::bare("sales@domain.com")];
        assert_eq!(engine.decide(&message).message().from, "sales@domain.com");
    }

    #[test]
    fn test_attachments_carried() {
        let mut message = inbound("ext@user.foo", "Inquiry");
        message.attachments = vec![Attachment {
            file_name: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
            base64_data: "aGVsbG8=".to_string(),
            content_id: None,
        }];
        let outcome = passthrough(OWNER).decide(&message);
        assert_eq!(outcome.into_message().attachments, message.attachments);
    }
}
