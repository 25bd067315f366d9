//! Relay service
//!
//! Owns the side effects around a relay decision: the audit copy, the
//! owner-facing error log for warning outcomes and the dispatch.

use super::engine::{RelayEngine, RelayOutcome};
use crate::dispatch::{create_dispatcher, MailDispatcher};
use mailrelay_common::types::InboundMessage;
use mailrelay_common::{Config, Result};
use mailrelay_storage::{AuditLog, LocalStorage};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What happened to one inbound message
#[derive(Debug, Clone, Serialize)]
pub struct RelayReport {
    pub relay_id: Uuid,
    /// Outcome kind, absent when relaying is disabled
    pub outcome: Option<&'static str>,
    /// Audit key, absent when auditing is disabled or failed
    pub audit_key: Option<String>,
}

struct Relay {
    engine: RelayEngine,
    dispatcher: Arc<dyn MailDispatcher>,
}

/// Audit, decide and dispatch
#[derive(Default)]
pub struct RelayService {
    relay: Option<Relay>,
    audit: Option<AuditLog>,
}

impl RelayService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relay(mut self, engine: RelayEngine, dispatcher: Arc<dyn MailDispatcher>) -> Self {
        self.relay = Some(Relay { engine, dispatcher });
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Wire storage, engine and dispatcher from a validated config
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut service = Self::new();

        if config.audit.enabled {
            let storage = LocalStorage::new(&config.audit)?;
            service = service.with_audit(AuditLog::new(Arc::new(storage)));
        }

        if config.relay_enabled() {
            let engine = RelayEngine::from_config(&config.relay)?;
            let dispatcher = create_dispatcher(&config.dispatch)?;
            info!(
                domain = %engine.settings().domain,
                backend = dispatcher.name(),
                send_as_domain = engine.settings().send_as_domain,
                "Relay enabled"
            );
            service = service.with_relay(engine, dispatcher);
        }

        Ok(service)
    }

    pub fn relay_enabled(&self) -> bool {
        self.relay.is_some()
    }

    pub fn audit_enabled(&self) -> bool {
        self.audit.is_some()
    }

    /// Process one inbound message; only a dispatch failure is an error
    pub async fn handle(&self, message: &InboundMessage) -> Result<RelayReport> {
        let relay_id = Uuid::new_v4();
        info!(
            relay_id = %relay_id,
            from = %message.from.email,
            subject = %message.subject,
            recipients = message.to.len() + message.cc.len(),
            "Inbound message received"
        );

        let audit_key = match &self.audit {
            Some(audit) => match audit.record(message).await {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(relay_id = %relay_id, error = %e, "Failed to store audit copy");
                    None
                }
            },
            None => None,
        };

        let Some(relay) = &self.relay else {
            return Ok(RelayReport {
                relay_id,
                outcome: None,
                audit_key,
            });
        };

        let outcome = relay.engine.decide(message);
        log_outcome(relay_id, message, &outcome);

        relay.dispatcher.dispatch(outcome.message()).await.map_err(|e| {
            error!(relay_id = %relay_id, backend = relay.dispatcher.name(), error = %e, "Dispatch failed");
            e
        })?;

        info!(
            relay_id = %relay_id,
            outcome = outcome.kind(),
            to = %outcome.message().to,
            "Relay message dispatched"
        );

        Ok(RelayReport {
            relay_id,
            outcome: Some(outcome.kind()),
            audit_key,
        })
    }
}

fn log_outcome(relay_id: Uuid, message: &InboundMessage, outcome: &RelayOutcome) {
    match outcome {
        RelayOutcome::WarnSpoofed { auth, .. } => error!(
            relay_id = %relay_id,
            from = %message.from.email,
            auth = %auth,
            spf = message.spf.as_deref().unwrap_or("none"),
            dkim = message.dkim.as_deref().unwrap_or("none"),
            "Rejected attempt to send as the domain"
        ),
        RelayOutcome::WarnSanitizeFailed { reason, .. } => error!(
            relay_id = %relay_id,
            reason = ?reason,
            "Failed to sanitize reply, original returned to owner"
        ),
        RelayOutcome::WarnDisabled(_) => warn!(
            relay_id = %relay_id,
            "Sending as domain is disabled, message returned to owner"
        ),
        RelayOutcome::WarnInvalidTarget(message) => warn!(
            relay_id = %relay_id,
            subject = %message.subject,
            "Relay tag target is not a valid address, message returned to owner"
        ),
        RelayOutcome::ForwardToOwner(_) | RelayOutcome::SendAsDomain(_) => {}
    }
}
