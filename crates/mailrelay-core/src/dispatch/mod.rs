//! Outbound mail dispatch
//!
//! Every relay decision produces exactly one message. A dispatcher hands
//! it to the outside world; any failure is reported to the caller so the
//! inbound gateway can retry the webhook.

mod sendgrid;
mod smtp;

pub use sendgrid::SendGridDispatcher;
pub use smtp::SmtpDispatcher;

use async_trait::async_trait;
use mailrelay_common::config::DispatchConfig;
use mailrelay_common::types::OutboundMessage;
use mailrelay_common::{Error, Result};
use std::sync::Arc;

/// Delivers one outbound message
#[async_trait]
pub trait MailDispatcher: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    async fn dispatch(&self, message: &OutboundMessage) -> Result<()>;
}

/// Build the dispatcher selected by `dispatch.backend`
pub fn create_dispatcher(config: &DispatchConfig) -> Result<Arc<dyn MailDispatcher>> {
    match config.backend.as_str() {
        "sendgrid" => Ok(Arc::new(SendGridDispatcher::new(&config.sendgrid)?)),
        "smtp" => Ok(Arc::new(SmtpDispatcher::new(&config.smtp)?)),
        other => Err(Error::Config(format!("Unknown dispatch backend: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_dispatcher() {
        let mut config = DispatchConfig::default();
        config.sendgrid.api_key = Some("SG.key".to_string());
        assert_eq!(create_dispatcher(&config).unwrap().name(), "sendgrid");

        config.backend = "smtp".to_string();
        config.smtp.host = Some("smtp.example.com".to_string());
        assert_eq!(create_dispatcher(&config).unwrap().name(), "smtp");

        config.backend = "carrier-pigeon".to_string();
        assert!(matches!(create_dispatcher(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_create_dispatcher_requires_credentials() {
        let config = DispatchConfig::default();
        assert!(matches!(create_dispatcher(&config), Err(Error::Config(_))));
    }
}
