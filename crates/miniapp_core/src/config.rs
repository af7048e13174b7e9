//! Kernel configuration.
//!
//! # Responsibility
//! - Hold every tunable limit, timeout and namespace the kernel uses.
//! - Load host-provided JSON overrides on top of built-in defaults.
//!
//! # Invariants
//! - Every field has a default; a host can pass `{}` and get a working kernel.
//! - `validate()` must succeed before a config reaches `Kernel::new`.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Default pending confirmation timeout (2 minutes).
pub const DEFAULT_CONFIRM_TIMEOUT_MS: u64 = 2 * 60 * 1000;
/// Default pending transfer timeout (5 minutes).
pub const DEFAULT_TRANSFER_TIMEOUT_MS: u64 = 5 * 60 * 1000;
/// Default pending deployment timeout (10 minutes).
pub const DEFAULT_DEPLOYMENT_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Maximum storage key length in characters.
pub const MAX_KEY_LENGTH: usize = 256;
/// Maximum serialized storage value size in bytes (1 MiB).
pub const MAX_VALUE_SIZE: usize = 1024 * 1024;
/// Maximum number of storage keys per app.
pub const MAX_KEYS_PER_APP: usize = 1000;

/// Kernel-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KernelConfig {
    pub storage_namespace: String,
    pub grants_namespace: String,
    pub contracts_namespace: String,
    pub max_key_length: usize,
    pub max_value_size: usize,
    pub max_keys_per_app: usize,
    pub confirm_timeout_ms: u64,
    pub transfer_timeout_ms: u64,
    pub deployment_timeout_ms: u64,
    /// Hard deadline for one handler invocation. `None` disables it.
    pub handler_timeout_ms: Option<u64>,
    pub replay_protection: bool,
    pub replay_window_ms: u64,
    pub clock_skew_ms: u64,
    pub rate_limit_capacity: u32,
    pub rate_limit_refill_per_second: u32,
    pub deep_link_scheme: String,
    /// Hosts accepted for `https://<host>/app/...` links. Empty accepts any host.
    pub web_hosts: Vec<String>,
    pub sandbox_route: String,
    pub default_installed_apps: Vec<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            storage_namespace: "miniapp_storage".to_string(),
            grants_namespace: "miniapp_grants".to_string(),
            contracts_namespace: "miniapp_contracts".to_string(),
            max_key_length: MAX_KEY_LENGTH,
            max_value_size: MAX_VALUE_SIZE,
            max_keys_per_app: MAX_KEYS_PER_APP,
            confirm_timeout_ms: DEFAULT_CONFIRM_TIMEOUT_MS,
            transfer_timeout_ms: DEFAULT_TRANSFER_TIMEOUT_MS,
            deployment_timeout_ms: DEFAULT_DEPLOYMENT_TIMEOUT_MS,
            handler_timeout_ms: None,
            replay_protection: true,
            replay_window_ms: 60_000,
            clock_skew_ms: 5_000,
            rate_limit_capacity: 100,
            rate_limit_refill_per_second: 10,
            deep_link_scheme: "bazari".to_string(),
            web_hosts: Vec::new(),
            sandbox_route: "/app/sandbox".to_string(),
            default_installed_apps: vec![
                "wallet".to_string(),
                "marketplace".to_string(),
                "chat".to_string(),
            ],
        }
    }
}

impl KernelConfig {
    /// Parses a JSON document, filling omitted fields from defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: KernelConfig =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("storageNamespace", &self.storage_namespace),
            ("grantsNamespace", &self.grants_namespace),
            ("contractsNamespace", &self.contracts_namespace),
            ("deepLinkScheme", &self.deep_link_scheme),
            ("sandboxRoute", &self.sandbox_route),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyValue(name));
            }
        }

        for (name, value) in [
            ("maxKeyLength", self.max_key_length as u64),
            ("maxValueSize", self.max_value_size as u64),
            ("maxKeysPerApp", self.max_keys_per_app as u64),
            ("confirmTimeoutMs", self.confirm_timeout_ms),
            ("transferTimeoutMs", self.transfer_timeout_ms),
            ("deploymentTimeoutMs", self.deployment_timeout_ms),
            ("rateLimitCapacity", u64::from(self.rate_limit_capacity)),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroLimit(name));
            }
        }

        if let Some(handler_ms) = self.handler_timeout_ms {
            if handler_ms == 0 {
                return Err(ConfigError::ZeroLimit("handlerTimeoutMs"));
            }
            // Pending operations must settle through their own timeout result.
            let pending_ms = self.longest_pending_timeout_ms();
            if handler_ms <= pending_ms {
                return Err(ConfigError::HandlerTimeoutTooShort {
                    handler_ms,
                    pending_ms,
                });
            }
        }
        Ok(())
    }

    fn longest_pending_timeout_ms(&self) -> u64 {
        self.confirm_timeout_ms
            .max(self.transfer_timeout_ms)
            .max(self.deployment_timeout_ms)
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }
}

/// Configuration load/validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    EmptyValue(&'static str),
    ZeroLimit(&'static str),
    /// `handlerTimeoutMs` would cut off a pending confirmation, transfer or deployment.
    HandlerTimeoutTooShort { handler_ms: u64, pending_ms: u64 },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid kernel config: {message}"),
            Self::EmptyValue(name) => write!(f, "kernel config `{name}` must not be empty"),
            Self::ZeroLimit(name) => write!(f, "kernel config `{name}` must be greater than zero"),
            Self::HandlerTimeoutTooShort {
                handler_ms,
                pending_ms,
            } => write!(
                f,
                "kernel config `handlerTimeoutMs` ({handler_ms}) must exceed the longest pending timeout ({pending_ms})"
            ),
        }
    }
}

impl Error for ConfigError {}
