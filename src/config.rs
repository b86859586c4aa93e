//! Runtime configuration
//!
//! Built from command-line flags (with environment fallbacks, see `cli`).
//! Zero values fall back to the defaults with a warning instead of failing.

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::relay::RetryPolicy;

/// Default location of the wallet data file
pub const DEFAULT_DATA_PATH: &str = "wallet.json";

/// Default tracing directive
pub const DEFAULT_LOG_FILTER: &str = "wallet_ledger=info";

/// Relay delivery settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl RelayOptions {
    /// Create options with custom values
    ///
    /// A zero timeout or attempt count falls back to the default.
    pub fn new(request_timeout: Duration, max_attempts: u32) -> Self {
        let default = Self::default();

        let request_timeout = if request_timeout.is_zero() {
            warn!(
                "Invalid relay request timeout (0), using default ({:?})",
                default.request_timeout
            );
            default.request_timeout
        } else {
            request_timeout
        };

        Self {
            request_timeout,
            retry: RetryPolicy::new(
                max_attempts,
                default.retry.base_delay,
                default.retry.max_delay,
            ),
        }
    }
}

/// Everything `main` needs to build a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_path: PathBuf,
    pub log_filter: String,
    pub relay: RelayOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            relay: RelayOptions::default(),
        }
    }
}
