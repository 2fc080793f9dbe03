use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::event::HubConfig;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub listen_addr: String,
    /// Unset means the in-memory store
    pub database_url: Option<String>,
    /// Newline separated card texts imported at startup
    pub cards_path: Option<String>,
    pub hub_queue_capacity: usize,
    pub hub_subscriber_buffer: usize,
    pub hub_delivery_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let hub = HubConfig::default();
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            database_url: None,
            cards_path: None,
            hub_queue_capacity: hub.queue_capacity,
            hub_subscriber_buffer: hub.subscriber_buffer,
            hub_delivery_timeout_ms: hub.delivery_timeout.as_millis() as u64,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Missing or unparsable
    /// values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            listen_addr: non_empty("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: non_empty("DATABASE_URL"),
            cards_path: non_empty("CARDS_PATH"),
            hub_queue_capacity: parsed(&lookup, "HUB_QUEUE_CAPACITY", defaults.hub_queue_capacity),
            hub_subscriber_buffer: parsed(
                &lookup,
                "HUB_SUBSCRIBER_BUFFER",
                defaults.hub_subscriber_buffer,
            ),
            hub_delivery_timeout_ms: parsed(
                &lookup,
                "HUB_DELIVERY_TIMEOUT_MS",
                defaults.hub_delivery_timeout_ms,
            ),
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            queue_capacity: self.hub_queue_capacity,
            subscriber_buffer: self.hub_subscriber_buffer,
            delivery_timeout: Duration::from_millis(self.hub_delivery_timeout_ms),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring unparsable configuration value");
            default
        }),
        None => default,
    }
}
