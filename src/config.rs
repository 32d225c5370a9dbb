use crate::voice::{ConnectionType, VoiceSessionConfig, DEFAULT_AGENT_ID};
use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

/// Service configuration.
///
/// Loaded from an optional file, then overridden by `COMPANION_`-prefixed
/// environment variables with `__` between sections, e.g.
/// `COMPANION_METRICS__API_KEY` or `COMPANION_SERVICE__HTTP__PORT`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub voice: VoiceConfig,
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    pub agent_id: String,
    pub connection_type: ConnectionType,
    pub nats_url: String,
    pub connect_timeout_secs: u64,
}

impl VoiceConfig {
    pub fn session_config(&self, companion_id: &str) -> VoiceSessionConfig {
        VoiceSessionConfig {
            agent_id: self.agent_id.clone(),
            connection_type: self.connection_type,
            companion_id: companion_id.to_string(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub base_url: String,

    /// Provider API key; metrics are skipped without one
    pub api_key: Option<String>,

    pub timeout_secs: u64,
}

impl MetricsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file; in-memory store when unset
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    pub evaluation_notice_secs: u64,

    /// How often controllers without a call are dropped
    pub sweep_interval_secs: u64,
}

impl SessionSettings {
    pub fn evaluation_notice(&self) -> Duration {
        Duration::from_secs(self.evaluation_notice_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = Self::builder()?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("COMPANION")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Built-in defaults only
    pub fn defaults() -> Result<Self> {
        Ok(Self::builder()?.build()?.try_deserialize()?)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder()
            .set_default("service.name", "companion-sessions")?
            .set_default("service.http.bind", "127.0.0.1")?
            .set_default("service.http.port", 8080i64)?
            .set_default("voice.agent_id", DEFAULT_AGENT_ID)?
            .set_default("voice.connection_type", "websocket")?
            .set_default("voice.nats_url", "nats://localhost:4222")?
            .set_default("voice.connect_timeout_secs", 10i64)?
            .set_default("metrics.base_url", "https://api.elevenlabs.io")?
            .set_default("metrics.timeout_secs", 5i64)?
            .set_default("session.evaluation_notice_secs", 3i64)?
            .set_default("session.sweep_interval_secs", 30i64)?)
    }
}
