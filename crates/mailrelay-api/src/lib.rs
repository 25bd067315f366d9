//! mailrelay API - Inbound webhook server
//!
//! This crate exposes the SendGrid Inbound Parse webhook and health
//! endpoints, and turns each posted form into an inbound message for the
//! relay service.

pub mod auth;
pub mod handlers;
pub mod inbound;
pub mod routes;

pub use auth::AppState;
pub use routes::create_router;
