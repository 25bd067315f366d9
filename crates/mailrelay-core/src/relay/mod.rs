//! Relay decisions and their side effects

mod engine;
mod service;

pub use engine::{
    normalize_domain, RelayEngine, RelayOutcome, RelaySettings, SanitizeFailure,
};
pub use service::{RelayReport, RelayService};
