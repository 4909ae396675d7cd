//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the acomms runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use tracing::debug;

use crate::logging::LogFormat;

/// Destination address meaning "every node on the network".
pub const BROADCAST_ID: u32 = 0;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_modem_id() -> u32 {
    1
}

fn default_ack_id() -> Option<u32> {
    Some(127)
}

fn default_ack_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_ack() -> bool {
    true
}

fn default_newest_first() -> bool {
    true
}

fn default_priority_base() -> f64 {
    1.0
}

fn default_priority_time_const() -> Duration {
    Duration::from_secs(120)
}

/// Primary configuration object for an acomms node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcommsConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    pub queue: QueueManagerConfig,
}

/// Metadata describing where an [`AcommsConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAcommsConfig {
    pub config: AcommsConfig,
    pub source: PathBuf,
}

impl AcommsConfig {
    pub const ENV_CONFIG_PATH: &str = "ACOMMS_CONFIG";

    /// Load configuration from disk, respecting the `ACOMMS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAcommsConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAcommsConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAcommsConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Read, parse and validate a single TOML file.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AcommsConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.codec.validate()?;
        self.queue.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AcommsConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AcommsConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// Message codec settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodecConfig {
    #[serde(default)]
    pub id_codec: IdCodecConfig,
}

impl CodecConfig {
    pub fn validate(&self) -> Result<()> {
        if let IdCodecConfig::Fixed { width } = self.id_codec {
            if width == 0 || width > 32 {
                return Err(anyhow!(
                    "fixed id codec width must be within 1..=32 bits, got {}",
                    width
                ));
            }
        }
        Ok(())
    }
}

/// Which identifier header is written in front of every encoded message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdCodecConfig {
    /// One or two bytes depending on the identifier value.
    #[default]
    Varint,
    /// A fixed number of bits.
    Fixed { width: u8 },
    /// No header at all; every decoded message is assumed to carry `id`.
    Zero { id: u32 },
}

/// Queue manager settings shared by every queue on a node.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueManagerConfig {
    #[serde(default = "default_modem_id")]
    pub modem_id: u32,
    /// Identifier of the reserved acknowledgement message; `None` disables acks.
    #[serde(default = "default_ack_id")]
    pub ack_id: Option<u32>,
    /// How long a sent message waits for its ack before it is eligible again.
    #[serde(default = "default_ack_timeout")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub ack_timeout: Duration,
    #[serde(default)]
    pub queues: IndexMap<String, QueueEntryConfig>,
}

impl Default for QueueManagerConfig {
    fn default() -> Self {
        Self {
            modem_id: default_modem_id(),
            ack_id: default_ack_id(),
            ack_timeout: default_ack_timeout(),
            queues: IndexMap::new(),
        }
    }
}

impl QueueManagerConfig {
    /// Retrieve a queue entry by message name.
    pub fn queue(&self, name: &str) -> Option<&QueueEntryConfig> {
        self.queues.get(name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.modem_id == BROADCAST_ID {
            return Err(anyhow!(
                "modem_id {} is reserved for broadcast",
                BROADCAST_ID
            ));
        }
        for (name, entry) in &self.queues {
            entry.config.validate(name)?;
        }
        Ok(())
    }
}

/// Per-queue entry: scheduling policy plus optional manipulators.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueEntryConfig {
    #[serde(flatten)]
    pub config: QueueConfig,
    #[serde(default)]
    pub manipulators: Vec<Manipulator>,
}

impl From<QueueConfig> for QueueEntryConfig {
    fn from(config: QueueConfig) -> Self {
        Self {
            config,
            manipulators: Vec::new(),
        }
    }
}

impl QueueEntryConfig {
    pub fn with_manipulator(mut self, manipulator: Manipulator) -> Self {
        if !self.has(manipulator) {
            self.manipulators.push(manipulator);
        }
        self
    }

    pub fn has(&self, manipulator: Manipulator) -> bool {
        self.manipulators.contains(&manipulator)
    }
}

/// Modifiers altering how a queue treats its messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Manipulator {
    /// Never queue; pushes are silently discarded.
    NoQueue,
    /// Deliver a copy of every pushed message to the local subscriber.
    Loopback,
    /// Deliver a copy to the local subscriber when the message is sent.
    LoopbackAsSent,
    /// Accept messages regardless of addressing.
    Promiscuous,
    /// Keep sent messages queued even when no ack is required.
    NoDequeue,
}

/// Which end of a full queue gives way to a new message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Eviction {
    DropOldest,
    RejectIncoming,
}

/// Scheduling policy for one message type.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    #[serde(default = "default_ack")]
    pub ack: bool,
    #[serde(default)]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub blackout_time: Duration,
    /// Maximum number of queued messages, `0` meaning unbounded.
    #[serde(default)]
    pub max_queue: usize,
    #[serde(default = "default_newest_first")]
    pub newest_first: bool,
    #[serde(default = "default_priority_base")]
    pub priority_base: f64,
    #[serde(default = "default_priority_time_const")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub priority_time_const: Duration,
    #[serde(default)]
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    pub ttl: Option<Duration>,
    #[serde(default)]
    pub eviction: Option<Eviction>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ack: default_ack(),
            blackout_time: Duration::ZERO,
            max_queue: 0,
            newest_first: default_newest_first(),
            priority_base: default_priority_base(),
            priority_time_const: default_priority_time_const(),
            ttl: None,
            eviction: None,
        }
    }
}

impl QueueConfig {
    pub fn with_ack(mut self, ack: bool) -> Self {
        self.ack = ack;
        self
    }

    pub fn with_blackout_time(mut self, blackout_time: Duration) -> Self {
        self.blackout_time = blackout_time;
        self
    }

    pub fn with_max_queue(mut self, max_queue: usize) -> Self {
        self.max_queue = max_queue;
        self
    }

    pub fn with_newest_first(mut self, newest_first: bool) -> Self {
        self.newest_first = newest_first;
        self
    }

    pub fn with_priority_base(mut self, priority_base: f64) -> Self {
        self.priority_base = priority_base;
        self
    }

    pub fn with_priority_time_const(mut self, time_const: Duration) -> Self {
        self.priority_time_const = time_const;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_eviction(mut self, eviction: Eviction) -> Self {
        self.eviction = Some(eviction);
        self
    }

    /// Eviction rule in force, derived from `newest_first` unless overridden.
    pub fn effective_eviction(&self) -> Eviction {
        self.eviction.unwrap_or(if self.newest_first {
            Eviction::RejectIncoming
        } else {
            Eviction::DropOldest
        })
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if !self.priority_base.is_finite() || self.priority_base < 0.0 {
            return Err(anyhow!(
                "queue '{}' priority_base must be a non-negative finite number",
                name
            ));
        }
        if self.priority_time_const.is_zero() {
            return Err(anyhow!(
                "queue '{}' priority_time_const must be greater than zero",
                name
            ));
        }
        if matches!(self.ttl, Some(ttl) if ttl.is_zero()) {
            return Err(anyhow!("queue '{}' ttl must be greater than zero", name));
        }
        Ok(())
    }
}
