//! Environment configuration for the Kernel adapters.

use anyhow::{anyhow, Result};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://api.onkernel.com";
pub const DEFAULT_POOL_NAME: &str = "browser-agent";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub api_key: String,
    pub base_url: String,
    /// Browser pool used by [`crate::KernelPool`]
    pub pool_name: String,
    pub request_timeout: Duration,
    /// How long the pool may block waiting for a free browser
    pub acquire_timeout: Duration,
}

impl KernelConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            pool_name: DEFAULT_POOL_NAME.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_pool_name(mut self, pool_name: impl Into<String>) -> Self {
        self.pool_name = pool_name.into();
        self
    }

    /// Reads `KERNEL_API_KEY` (required), `KERNEL_BASE_URL`,
    /// `KERNEL_BROWSER_POOL` and `KERNEL_ACQUIRE_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("KERNEL_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("KERNEL_API_KEY is not set"))?;

        let mut config = Self::new(api_key.trim());
        if let Some(base_url) = lookup("KERNEL_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.base_url = base_url.trim().to_string();
        }
        if let Some(pool) = lookup("KERNEL_BROWSER_POOL").filter(|v| !v.trim().is_empty()) {
            config.pool_name = pool.trim().to_string();
        }
        if let Some(raw) = lookup("KERNEL_ACQUIRE_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => config.acquire_timeout = Duration::from_secs(secs),
                Err(_) => warn!(
                    "[kernel] Ignoring KERNEL_ACQUIRE_TIMEOUT_SECS={:?}, using {:?}",
                    raw, config.acquire_timeout
                ),
            }
        }
        Ok(config)
    }
}
