//! Controller configuration, read from environment variables.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_RESYNC_SECONDS: u64 = 300;
const DEFAULT_RETRY_MIN_SECONDS: u64 = 5;
const DEFAULT_RETRY_MAX_SECONDS: u64 = 300;
const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8080";

/// Runtime configuration of the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Namespace to watch (`WATCH_NAMESPACE`); `None` watches all namespaces
    pub namespace: Option<String>,
    /// Full resync period (`RESYNC_INTERVAL_SECONDS`); `None` when set to 0
    pub resync_interval: Option<Duration>,
    /// First redelivery delay after a failed pass (`RETRY_MIN_SECONDS`)
    pub retry_min: Duration,
    /// Redelivery delay cap (`RETRY_MAX_SECONDS`)
    pub retry_max: Duration,
    /// Metrics and probe listen address (`PROBE_ADDR`)
    pub probe_addr: SocketAddr,
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a variable if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let seconds = |key: &str, default: u64| -> Result<u64, ControllerError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                    ControllerError::InvalidConfig(format!("{} must be a whole number of seconds, got {:?}: {}", key, raw, e))
                }),
            }
        };

        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());
        let resync = seconds("RESYNC_INTERVAL_SECONDS", DEFAULT_RESYNC_SECONDS)?;
        let retry_min = seconds("RETRY_MIN_SECONDS", DEFAULT_RETRY_MIN_SECONDS)?;
        let retry_max = seconds("RETRY_MAX_SECONDS", DEFAULT_RETRY_MAX_SECONDS)?;
        if retry_min == 0 || retry_max < retry_min {
            return Err(ControllerError::InvalidConfig(format!(
                "retry bounds must satisfy 0 < RETRY_MIN_SECONDS <= RETRY_MAX_SECONDS, got {} and {}",
                retry_min, retry_max
            )));
        }

        let probe_raw = lookup("PROBE_ADDR").unwrap_or_else(|| DEFAULT_PROBE_ADDR.to_string());
        let probe_addr = probe_raw.parse::<SocketAddr>().map_err(|e| {
            ControllerError::InvalidConfig(format!("PROBE_ADDR {:?} is not a socket address: {}", probe_raw, e))
        })?;

        Ok(Self {
            namespace,
            resync_interval: (resync > 0).then(|| Duration::from_secs(resync)),
            retry_min: Duration::from_secs(retry_min),
            retry_max: Duration::from_secs(retry_max),
            probe_addr,
        })
    }
}
