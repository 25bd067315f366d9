//! mailrelay Common - Shared types and configuration
//!
//! This crate provides the message types, configuration, and error
//! type shared across all mailrelay components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
