//! mailrelay Storage - Audit copy persistence
//!
//! This crate provides a small blob storage abstraction and the
//! audit log that stores a JSON copy of every inbound message.

pub mod audit;
pub mod file;

pub use audit::{AuditLog, AuditRecord};
pub use file::{FileStorage, LocalStorage};
