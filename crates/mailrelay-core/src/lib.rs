//! mailrelay Core - Relay decisions and reply sanitization
//!
//! This crate turns one inbound message into exactly one outbound message:
//! mail to the domain is forwarded to the private owner, and the owner's
//! tagged replies are sent as the domain after their quoted headers are
//! scrubbed of private addresses.

pub mod address;
pub mod auth;
pub mod dispatch;
pub mod relay;
pub mod sanitize;
pub mod subject;

pub use auth::{authorize, AuthResult};
pub use dispatch::{create_dispatcher, MailDispatcher, SendGridDispatcher, SmtpDispatcher};
pub use relay::{RelayEngine, RelayOutcome, RelayReport, RelayService, RelaySettings};
pub use sanitize::{MetadataSanitizer, OutlookWebSanitizer, SanitizeOutcome, SanitizerSet};
pub use subject::{SubjectParser, SubjectTag};
