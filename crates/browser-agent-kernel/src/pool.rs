//! Kernel browser pools as a [`SessionPool`].

use crate::config::KernelConfig;
use crate::kernel::KernelClient;
use async_trait::async_trait;
use browser_agent::{PoolError, SessionHandle, SessionPool};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize)]
struct AcquiredBrowser {
    session_id: String,
}

pub struct KernelPool {
    client: KernelClient,
    pool_name: String,
    acquire_timeout: Duration,
}

impl KernelPool {
    pub fn new(client: KernelClient, pool_name: impl Into<String>) -> Self {
        Self {
            client,
            pool_name: pool_name.into(),
            acquire_timeout: crate::config::DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    pub fn from_config(config: &KernelConfig) -> anyhow::Result<Self> {
        Ok(Self::new(KernelClient::new(config)?, config.pool_name.clone())
            .with_acquire_timeout(config.acquire_timeout))
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }
}

#[async_trait]
impl SessionPool for KernelPool {
    async fn acquire(&self) -> Result<SessionHandle, PoolError> {
        let resp = self
            .client
            .post(
                &format!("/browser_pools/{}/acquire", self.pool_name),
                &json!({ "acquire_timeout_seconds": self.acquire_timeout.as_secs() }),
            )
            .await
            .map_err(|e| PoolError::Acquire(e.to_string()))?;
        let acquired: AcquiredBrowser = resp
            .json()
            .await
            .map_err(|e| PoolError::Acquire(format!("invalid acquire response: {}", e)))?;

        info!(
            "[kernel] Acquired session {} from pool {}",
            acquired.session_id, self.pool_name
        );
        Ok(SessionHandle {
            id: acquired.session_id.clone(),
            browser: Arc::new(self.client.browser(acquired.session_id)),
        })
    }

    async fn release(&self, session_id: &str, reuse: bool) -> Result<(), PoolError> {
        self.client
            .post(
                &format!("/browser_pools/{}/release", self.pool_name),
                &json!({ "session_id": session_id, "reuse": reuse }),
            )
            .await
            .map_err(|e| PoolError::Release {
                session_id: session_id.to_string(),
                message: e.to_string(),
            })?;
        info!(
            "[kernel] Released session {} to pool {} (reuse={})",
            session_id, self.pool_name, reuse
        );
        Ok(())
    }
}
