//! Dispatcher configuration.

use std::env;

use tracing::warn;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

pub const WORKERS_ENV: &str = "COURIER_WORKERS";
pub const QUEUE_SIZE_ENV: &str = "COURIER_QUEUE_SIZE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Worker loops started by `Dispatcher::start`. Fixed for the dispatcher's lifetime.
    pub workers: usize,

    /// Pending tasks admitted beyond the ones workers are waiting for.
    pub queue_capacity: usize,

    pub retry: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }
}

impl DispatcherConfig {
    /// Read `COURIER_WORKERS` / `COURIER_QUEUE_SIZE`.
    ///
    /// Unset variables use the defaults. Invalid values are logged and also
    /// fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let workers = lookup(WORKERS_ENV)
            .map(|raw| parse_positive(WORKERS_ENV, &raw))
            .unwrap_or(Ok(DEFAULT_WORKERS))
            .unwrap_or_else(|e| {
                warn!("{e}, using default {DEFAULT_WORKERS}");
                DEFAULT_WORKERS
            });

        let queue_capacity = lookup(QUEUE_SIZE_ENV)
            .map(|raw| parse_count(QUEUE_SIZE_ENV, &raw))
            .unwrap_or(Ok(DEFAULT_QUEUE_CAPACITY))
            .unwrap_or_else(|e| {
                warn!("{e}, using default {DEFAULT_QUEUE_CAPACITY}");
                DEFAULT_QUEUE_CAPACITY
            });

        Self {
            workers,
            queue_capacity,
            ..Self::default()
        }
    }
}

fn parse_count(name: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidNumber {
            name: name.to_string(),
            value: raw.to_string(),
        })
}

fn parse_positive(name: &str, raw: &str) -> Result<usize, ConfigError> {
    match parse_count(name, raw)? {
        0 => Err(ConfigError::NotPositive {
            name: name.to_string(),
        }),
        n => Ok(n),
    }
}
