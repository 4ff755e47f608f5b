//! Moondream vision API as a [`VisionService`].

use crate::preview;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use browser_agent::{CaptionLength, Screenshot, VisionError, VisionService};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.moondream.ai/v1";

pub struct MoondreamClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MoondreamClient {
    pub fn new(api_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
        })
    }

    /// Reads `MOONDREAM_API_KEY`.
    pub fn from_env() -> anyhow::Result<Self> {
        let key = std::env::var("MOONDREAM_API_KEY").context("MOONDREAM_API_KEY is not set")?;
        Self::new(key)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn post(&self, path: &str, payload: Value) -> Result<Map<String, Value>, VisionError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("X-Moondream-Auth", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("Moondream request failed: {}", e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!("[moondream] {} returned {} - {}", path, status, preview(&text));
            return Err(anyhow!("Moondream API error ({}): {}", status, text).into());
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| VisionError::InvalidResponse(e.to_string()))?;
        debug!("[moondream] {} -> {}", path, preview(&data.to_string()));
        match data {
            Value::Object(map) => Ok(map),
            other => Err(VisionError::InvalidResponse(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }
}

fn string_field(data: &Map<String, Value>, key: &str) -> Result<String, VisionError> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| VisionError::InvalidResponse(format!("missing \"{}\"", key)))
}

/// First entry of a `points` array, when it has numeric coordinates.
fn first_point(data: &Map<String, Value>) -> Option<(f64, f64)> {
    let point = data.get("points")?.as_array()?.first()?;
    Some((point.get("x")?.as_f64()?, point.get("y")?.as_f64()?))
}

#[async_trait]
impl VisionService for MoondreamClient {
    async fn query(&self, image: &Screenshot, question: &str) -> Result<String, VisionError> {
        let data = self
            .post(
                "/query",
                json!({ "image_url": image.data_url(), "question": question }),
            )
            .await?;
        string_field(&data, "answer")
    }

    async fn point(
        &self,
        image: &Screenshot,
        object: &str,
    ) -> Result<Option<(f64, f64)>, VisionError> {
        let data = self
            .post(
                "/point",
                json!({ "image_url": image.data_url(), "object": object }),
            )
            .await?;
        Ok(first_point(&data))
    }

    async fn caption(
        &self,
        image: &Screenshot,
        length: CaptionLength,
    ) -> Result<String, VisionError> {
        let data = self
            .post(
                "/caption",
                json!({
                    "image_url": image.data_url(),
                    "length": length.as_str(),
                    "stream": false,
                }),
            )
            .await?;
        string_field(&data, "caption")
    }
}
