//! OutputBlueprint - Config Loader output
//!
//! Describes the output stream and every transport it fans out to.
//! Resolved once at startup and immutable afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use validator::Validate;

use crate::{ContractError, StreamDefinition};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OutputBlueprint {
    #[serde(default)]
    pub version: ConfigVersion,

    /// Stream whose events are dispatched
    #[validate(nested)]
    pub stream: StreamDefinition,

    /// Let transports with identical pool settings share one dispatch queue
    ///
    /// Off by default: every transport gets its own queue, so one saturated
    /// sink cannot eat another's capacity.
    #[serde(default)]
    pub share_pools: bool,

    /// Configured transports
    #[serde(default)]
    #[validate(nested)]
    pub transports: Vec<TransportDescriptor>,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransportDescriptor {
    /// Transport name (used for logging/metrics)
    #[validate(length(min = 1))]
    pub name: String,

    /// Registered transport type (e.g. "log", "file", "network")
    #[serde(rename = "type")]
    #[validate(length(min = 1))]
    pub transport_type: String,

    /// Destination address or path
    #[serde(default)]
    pub destination: Option<String>,

    /// Routing-key expression, e.g. `"stock-{{symbol}}"`
    #[serde(default)]
    pub routing_key: Option<String>,

    /// Dispatch pool sizing
    #[serde(default)]
    #[validate(nested)]
    pub pool: PoolSettings,

    /// Optional `key:value` entries separated by commas
    #[serde(default)]
    pub properties: Option<String>,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl TransportDescriptor {
    /// Descriptor with default pool settings and no optional fields
    pub fn new(name: impl Into<String>, transport_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport_type: transport_type.into(),
            destination: None,
            routing_key: None,
            pool: PoolSettings::default(),
            properties: None,
            params: HashMap::new(),
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_routing_key(mut self, expression: impl Into<String>) -> Self {
        self.routing_key = Some(expression.into());
        self
    }

    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_properties(mut self, properties: impl Into<String>) -> Self {
        self.properties = Some(properties.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Destination, or a configuration error naming this transport
    pub fn require_destination(&self) -> Result<&str, ContractError> {
        self.destination
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| {
                ContractError::configuration(
                    format!("transports[{}].destination", self.name),
                    "destination is required for this transport type",
                )
            })
    }
}

/// Dispatch pool sizing
///
/// With pool sharing enabled, value-equal settings share one dispatch queue,
/// so this type is the pool registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Validate)]
pub struct PoolSettings {
    /// Workers kept alive while idle
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,

    /// Upper bound on concurrent workers
    #[serde(default = "default_max_workers")]
    #[validate(range(min = 1))]
    pub max_workers: usize,

    /// Idle time after which workers above `min_workers` retire
    #[serde(default = "default_keep_alive_ms")]
    #[validate(range(min = 1))]
    pub keep_alive_ms: u64,

    /// Queue capacity; submissions beyond it are rejected
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,
}

fn default_min_workers() -> usize {
    8
}

fn default_max_workers() -> usize {
    100
}

fn default_keep_alive_ms() -> u64 {
    20_000
}

fn default_queue_capacity() -> usize {
    2000
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            keep_alive_ms: default_keep_alive_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl PoolSettings {
    pub fn new(min_workers: usize, max_workers: usize, queue_capacity: usize) -> Self {
        Self {
            min_workers,
            max_workers,
            queue_capacity,
            ..Default::default()
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_ms = keep_alive.as_millis() as u64;
        self
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    /// Check bounds that field-level validation cannot express
    pub fn check(&self) -> Result<(), ContractError> {
        if self.max_workers == 0 {
            return Err(ContractError::configuration(
                "pool.max_workers",
                "max_workers must be >= 1",
            ));
        }
        if self.min_workers > self.max_workers {
            return Err(ContractError::configuration(
                "pool.min_workers / pool.max_workers",
                format!(
                    "min_workers ({}) must be <= max_workers ({})",
                    self.min_workers, self.max_workers
                ),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ContractError::configuration(
                "pool.queue_capacity",
                "queue_capacity must be >= 1",
            ));
        }
        if self.keep_alive_ms == 0 {
            return Err(ContractError::configuration(
                "pool.keep_alive_ms",
                "keep_alive_ms must be >= 1",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for PoolSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "workers={}..{},queue={},keep_alive={}ms",
            self.min_workers, self.max_workers, self.queue_capacity, self.keep_alive_ms
        )
    }
}
