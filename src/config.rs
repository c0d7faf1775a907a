use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, RosterError};

/// Connection settings for the hosted REST data store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Project base URL, e.g. `https://xyz.example.co`. `/rest/v1` is appended.
    pub base_url: String,
    /// Service key sent as both `apikey` and bearer token.
    pub api_key: String,
    /// Per-request timeout
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:54321".to_string(),
            api_key: String::new(),
            timeout_ms: 10_000,
        }
    }
}

/// Transactional mail API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    pub api_base: String,
    pub api_key: String,
    /// Sender shown to recipients
    pub from: String,
    /// Optional link to the admin view, appended to admin mails
    pub dashboard_url: Option<String>,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.resend.com".to_string(),
            api_key: String::new(),
            from: "Shift Roster <onboarding@resend.dev>".to_string(),
            dashboard_url: None,
        }
    }
}

/// Mail queue consumer settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Jobs fetched per pass
    pub batch_limit: usize,
    pub poll_interval_ms: u64,
    /// `last_error` is truncated to this many characters
    pub max_error_len: usize,
    /// Capacity of the fire-and-forget enqueue channel
    pub enqueue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_limit: 25,
            poll_interval_ms: 60_000,
            max_error_len: 500,
            enqueue_capacity: 256,
        }
    }
}

/// Schedule editing behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hours written by auto-fill
    pub autofill_hours: f64,
    /// Deletes are sent in batches of this size
    pub delete_chunk_size: usize,
    /// Maximum number of undo batches kept
    pub history_limit: usize,
    /// Days loaded into the grid on startup
    pub default_range_days: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autofill_hours: 8.0,
            delete_chunk_size: 500,
            history_limit: 100,
            default_range_days: 14,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub mailer: MailerConfig,
    pub dispatcher: DispatcherConfig,
    pub session: SessionConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Parse a TOML document. Missing sections and keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RosterError::Config(e.to_string()))
    }

    /// Load from an optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| {
                    RosterError::Config(format!("cannot read {}: {}", p.display(), e))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply overrides from a key lookup (the process environment in `load`).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("REMOTE_URL") {
            self.remote.base_url = v;
        }
        if let Some(v) = lookup("REMOTE_API_KEY") {
            self.remote.api_key = v;
        }
        if let Some(v) = lookup("MAIL_API_KEY") {
            self.mailer.api_key = v;
        }
        if let Some(v) = lookup("MAIL_FROM") {
            self.mailer.from = v;
        }
        if let Some(v) = lookup("DASHBOARD_URL") {
            self.mailer.dashboard_url = Some(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.delete_chunk_size == 0 {
            return Err(RosterError::Config(
                "session.delete_chunk_size must be positive".to_string(),
            ));
        }
        if !(self.session.autofill_hours.is_finite() && self.session.autofill_hours > 0.0) {
            return Err(RosterError::Config(
                "session.autofill_hours must be a positive number".to_string(),
            ));
        }
        if self.dispatcher.batch_limit == 0 {
            return Err(RosterError::Config(
                "dispatcher.batch_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.server.listen_addr = addr;
        self
    }
}
