//! Configuration for mailrelay

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix, e.g. `MAILRELAY__RELAY__TARGET_EMAIL`
pub const ENV_PREFIX: &str = "MAILRELAY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Relay configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// Outbound mail dispatch configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Audit copy configuration
    #[serde(default)]
    pub audit: AuditConfig,

    /// Webhook API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// How the sender of a spoofing attempt appears in the owner warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpoofWarningSender {
    /// Embed the claimed sender address verbatim
    #[default]
    Literal,
    /// Replace the sender address with a placeholder
    Redacted,
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Private mailbox owning the domain; relaying is off when unset
    pub target_email: Option<String>,

    /// Public domain, with or without the leading `@`
    pub domain: Option<String>,

    /// Allow the owner to send as the domain
    #[serde(default)]
    pub send_as_domain: bool,

    /// Subject tag token
    #[serde(default = "default_subject_tag")]
    pub subject_tag: String,

    #[serde(default)]
    pub spoof_warning_sender: SpoofWarningSender,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            target_email: None,
            domain: None,
            send_as_domain: false,
            subject_tag: default_subject_tag(),
            spoof_warning_sender: SpoofWarningSender::default(),
        }
    }
}

/// Default subject tag token
pub fn default_subject_tag() -> String {
    "Relay for".to_string()
}

/// Outbound dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Dispatch backend: "sendgrid" or "smtp"
    #[serde(default = "default_dispatch_backend")]
    pub backend: String,

    #[serde(default)]
    pub sendgrid: SendGridConfig,

    #[serde(default)]
    pub smtp: SmtpConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            backend: default_dispatch_backend(),
            sendgrid: SendGridConfig::default(),
            smtp: SmtpConfig::default(),
        }
    }
}

fn default_dispatch_backend() -> String {
    "sendgrid".to_string()
}

/// SendGrid v3 API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendGridConfig {
    /// API key
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_sendgrid_url")]
    pub api_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SendGridConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_sendgrid_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_sendgrid_url() -> String {
    "https://api.sendgrid.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// SMTP relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host
    pub host: Option<String>,

    /// Relay port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Transport security: "tls", "starttls" or "none"
    #[serde(default = "default_smtp_security")]
    pub security: String,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Command timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            security: default_smtp_security(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_security() -> String {
    "starttls".to_string()
}

/// Audit copy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Store a JSON copy of every inbound message
    #[serde(default)]
    pub enabled: bool,

    /// Base path for local filesystem storage
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_audit_path(),
        }
    }
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("/var/lib/mailrelay/audit")
}

/// Webhook API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Shared key the gateway must present as `?code=` or `x-webhook-key`
    pub webhook_key: Option<String>,

    /// Maximum accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            webhook_key: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_max_body_bytes() -> usize {
    30 * 1024 * 1024 // 30 MB, the inbound parse limit
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&content)
    }

    /// Load configuration from the default file locations and the environment
    pub fn load() -> crate::Result<Self> {
        let paths = [
            PathBuf::from("./mailrelay.toml"),
            PathBuf::from("/etc/mailrelay/config.toml"),
        ];

        let file = paths.into_iter().find(|path| path.exists());
        Self::load_from(file.as_deref())
    }

    /// Layer an optional TOML file with `MAILRELAY__SECTION__KEY` variables
    pub fn load_from(file: Option<&Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            tracing::debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Whether inbound messages are relayed at all
    pub fn relay_enabled(&self) -> bool {
        self.relay
            .target_email
            .as_deref()
            .is_some_and(|target| !target.trim().is_empty())
    }

    /// Check required settings; any error here is fatal at startup
    pub fn validate(&self) -> crate::Result<()> {
        if !self.relay_enabled() && !self.audit.enabled {
            return Err(crate::Error::Config(
                "Neither relay.target_email nor audit.enabled is set".to_string(),
            ));
        }

        if !self.relay_enabled() {
            return Ok(());
        }

        if is_blank(self.relay.domain.as_deref()) {
            return Err(crate::Error::Config(
                "relay.domain must be set when relaying is enabled".to_string(),
            ));
        }

        if self.relay.subject_tag.trim().is_empty() {
            return Err(crate::Error::Config(
                "relay.subject_tag must not be empty".to_string(),
            ));
        }

        match self.dispatch.backend.as_str() {
            "sendgrid" => {
                if is_blank(self.dispatch.sendgrid.api_key.as_deref()) {
                    return Err(crate::Error::Config(
                        "dispatch.sendgrid.api_key must be set when relaying is enabled"
                            .to_string(),
                    ));
                }
            }
            "smtp" => {
                if is_blank(self.dispatch.smtp.host.as_deref()) {
                    return Err(crate::Error::Config(
                        "dispatch.smtp.host must be set when relaying is enabled".to_string(),
                    ));
                }
            }
            other => {
                return Err(crate::Error::Config(format!(
                    "Unsupported dispatch backend: {}",
                    other
                )))
            }
        }

        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}
