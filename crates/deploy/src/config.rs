//! Run configuration: ledger settings passed through to the client, retry
//! policy, and confirmation bounds.
//!
//! Everything here is explicit state handed to the orchestrator at
//! construction. Nothing is read from ambient process state.

use std::path::Path;
use std::time::Duration;

use alloy_core::primitives::Address;
use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};

use crate::error::DeployError;

/// Default gas ceiling, matching the development chains this system targets.
pub const DEFAULT_GAS_CEILING: u64 = 8_000_000;
/// Default gas price in wei (1 gwei).
pub const DEFAULT_GAS_PRICE: u64 = 1_000_000_000;
/// Default RPC port of a local development node.
pub const DEFAULT_PORT: u16 = 8545;

/// Ledger-facing configuration. The orchestrator does not interpret these
/// values beyond the gas ceiling default; they are passed through to the
/// ledger client with each request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Network identifier of the target chain.
    pub network_id: u64,
    /// Host of the ledger endpoint.
    pub host: String,
    /// Port of the ledger endpoint.
    pub port: u16,
    /// Maximum gas a single transaction may declare.
    pub gas_ceiling: u64,
    /// Gas price in wei.
    pub gas_price: u64,
    /// Accounts available to the run. The first account signs everything.
    pub accounts: Vec<Address>,
}

impl LedgerSettings {
    /// An in-process ganache chain: network 35, 20 gwei.
    pub fn ganache() -> Self {
        Self {
            network_id: 35,
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            gas_ceiling: DEFAULT_GAS_CEILING,
            gas_price: 20_000_000_000,
            accounts: Vec::new(),
        }
    }

    /// A long-lived local ganache instance: network 1335, 1 gwei.
    pub fn ganache_dev() -> Self {
        Self {
            network_id: 1335,
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            gas_ceiling: DEFAULT_GAS_CEILING,
            gas_price: DEFAULT_GAS_PRICE,
            accounts: Vec::new(),
        }
    }

    /// A `geth --dev` node: network 1337, the dev-mode initial gas limit.
    pub fn geth_dev() -> Self {
        Self {
            network_id: 1337,
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            gas_ceiling: 6_283_185,
            gas_price: DEFAULT_GAS_PRICE,
            accounts: Vec::new(),
        }
    }

    /// Replace the account set.
    pub fn with_accounts(mut self, accounts: Vec<Address>) -> Self {
        self.accounts = accounts;
        self
    }

    /// The account that signs deployments and calls.
    pub fn deployer(&self) -> Address {
        self.accounts.first().copied().unwrap_or(Address::ZERO)
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self::ganache_dev()
    }
}

/// Bounded exponential backoff applied to transient submission failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Cap on the backoff delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never retries. Useful when the caller wants every
    /// submission failure surfaced immediately.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub(crate) fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Full configuration of a provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Ledger passthrough settings.
    pub ledger: LedgerSettings,
    /// Backoff applied to transient submission failures.
    pub retry: RetryPolicy,
    /// Bound on how long a single transaction may stay unconfirmed.
    pub confirmation_timeout: Duration,
    /// Interval between confirmation polls.
    pub poll_interval: Duration,
}

impl RunConfig {
    pub fn new(ledger: LedgerSettings) -> Self {
        Self {
            ledger,
            ..Self::default()
        }
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), DeployError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DeployError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|source| DeployError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, DeployError> {
        let content = std::fs::read_to_string(path).map_err(|source| DeployError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|e| DeployError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerSettings::default(),
            retry: RetryPolicy::default(),
            confirmation_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
        }
    }
}
