//! Node configuration
//!
//! Every setting has a default; `from_env` overrides them from `COURIER_*`
//! environment variables. Malformed values are logged and ignored.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::talk::{DEFAULT_ASK_TIMEOUT, DEFAULT_STOP_GRACE};
use crate::worker::WorkerPoolConfig;

/// How a group router picks among live providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
    /// Rotate through providers in order
    #[default]
    RoundRobin,
    /// Pick a provider uniformly at random
    Random,
}

impl RoutingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingPolicy::RoundRobin => "round_robin",
            RoutingPolicy::Random => "random",
        }
    }
}

impl fmt::Display for RoutingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(RoutingPolicy::RoundRobin),
            "random" => Ok(RoutingPolicy::Random),
            other => Err(format!("unknown routing policy: {other}")),
        }
    }
}

/// Configuration for one courier node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Node name used in logs
    pub node_name: String,

    /// Worker pool settings
    pub pool: WorkerPoolConfig,

    /// Default timeout for asks and invocations
    #[serde(with = "duration_millis")]
    pub ask_timeout: Duration,

    /// How long shutdown waits for each actor to acknowledge
    #[serde(with = "duration_millis")]
    pub stop_grace_period: Duration,

    /// Provider selection policy for group routers
    pub routing: RoutingPolicy,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            node_name: format!("node-{}", Uuid::now_v7().simple()),
            pool: WorkerPoolConfig::default(),
            ask_timeout: DEFAULT_ASK_TIMEOUT,
            stop_grace_period: DEFAULT_STOP_GRACE,
            routing: RoutingPolicy::default(),
        }
    }
}

impl CourierConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `COURIER_NODE_NAME`: Node name (default: generated)
    /// - `COURIER_ASK_TIMEOUT_MS`: Ask/invocation timeout (default: 5000)
    /// - `COURIER_STOP_GRACE_MS`: Stop acknowledgment window (default: 10000)
    /// - `COURIER_ROUTING`: `round_robin` or `random` (default: round_robin)
    /// - `COURIER_POOL_*`: see [`WorkerPoolConfig::from_env`]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            node_name: std::env::var("COURIER_NODE_NAME").unwrap_or(defaults.node_name),
            pool: WorkerPoolConfig::from_env(),
            ask_timeout: Duration::from_millis(env_or(
                "COURIER_ASK_TIMEOUT_MS",
                defaults.ask_timeout.as_millis() as u64,
            )),
            stop_grace_period: Duration::from_millis(env_or(
                "COURIER_STOP_GRACE_MS",
                defaults.stop_grace_period.as_millis() as u64,
            )),
            routing: env_or("COURIER_ROUTING", defaults.routing),
        }
    }

    pub fn with_node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = name.into();
        self
    }

    pub fn with_pool(mut self, pool: WorkerPoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_ask_timeout(mut self, timeout: Duration) -> Self {
        self.ask_timeout = timeout;
        self
    }

    pub fn with_stop_grace_period(mut self, grace: Duration) -> Self {
        self.stop_grace_period = grace;
        self
    }

    pub fn with_routing(mut self, routing: RoutingPolicy) -> Self {
        self.routing = routing;
        self
    }
}

/// Read and parse an environment variable, falling back to `default`
pub(crate) fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                warn!(key, value = %raw, error = %e, "Ignoring malformed environment variable");
                default
            }
        },
        Err(_) => default,
    }
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
