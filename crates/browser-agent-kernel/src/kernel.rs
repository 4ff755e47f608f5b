//! Kernel remote-browser API: computer controls plus Playwright execution
//! for navigation and URL reporting.

use crate::config::KernelConfig;
use crate::preview;
use async_trait::async_trait;
use browser_agent::{BrowserControl, ControlError, MouseButton, Point};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Upper bound for a single Playwright snippet on the remote side.
const PLAYWRIGHT_TIMEOUT_SECS: u64 = 60;

/// Shared HTTP client for the Kernel API. Cheap to clone.
#[derive(Debug, Clone)]
pub struct KernelClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl KernelClient {
    pub fn new(config: &KernelConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Control surface for one browser session.
    pub fn browser(&self, session_id: impl Into<String>) -> KernelBrowser {
        KernelBrowser {
            client: self.clone(),
            session_id: session_id.into(),
        }
    }

    pub(crate) async fn post(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<reqwest::Response, ControlError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ControlError::Transient(format!("request to {} failed: {}", path, e)))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        warn!("[kernel] {} returned {} - {}", path, status, preview(&text));
        Err(classify(
            status,
            format!("Kernel API error ({}): {}", status, text),
        ))
    }
}

/// Auth failures and missing or deleted sessions cannot be retried.
pub(crate) fn classify(status: StatusCode, message: String) -> ControlError {
    match status {
        StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND
        | StatusCode::GONE => ControlError::SessionInvalid(message),
        _ => ControlError::Transient(message),
    }
}

#[derive(Debug, Deserialize)]
struct PlaywrightResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// One Kernel browser session.
#[derive(Debug, Clone)]
pub struct KernelBrowser {
    client: KernelClient,
    session_id: String,
}

impl KernelBrowser {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn computer(&self, op: &str, body: Value) -> Result<reqwest::Response, ControlError> {
        debug!("[kernel] {} {} {}", self.session_id, op, body);
        self.client
            .post(
                &format!("/browsers/{}/computer/{}", self.session_id, op),
                &body,
            )
            .await
    }

    /// Run a Playwright snippet with `page` in scope and return its result.
    async fn execute_playwright(&self, code: &str) -> Result<Option<Value>, ControlError> {
        let resp = self
            .client
            .post(
                &format!("/browsers/{}/playwright/execute", self.session_id),
                &json!({ "code": code, "timeout_sec": PLAYWRIGHT_TIMEOUT_SECS }),
            )
            .await?;
        let parsed: PlaywrightResponse = resp
            .json()
            .await
            .map_err(|e| ControlError::Transient(format!("invalid playwright response: {}", e)))?;
        if !parsed.success {
            return Err(ControlError::Transient(format!(
                "playwright execution failed: {}",
                parsed.error.as_deref().unwrap_or("unknown error")
            )));
        }
        Ok(parsed.result)
    }
}

#[async_trait]
impl BrowserControl for KernelBrowser {
    async fn click_mouse(
        &self,
        at: Point,
        button: MouseButton,
        count: u8,
    ) -> Result<(), ControlError> {
        self.computer(
            "click_mouse",
            json!({
                "x": at.x,
                "y": at.y,
                "button": button.as_str(),
                "click_type": "click",
                "num_clicks": count,
            }),
        )
        .await
        .map(drop)
    }

    async fn move_mouse(&self, at: Point) -> Result<(), ControlError> {
        self.computer("move_mouse", json!({ "x": at.x, "y": at.y }))
            .await
            .map(drop)
    }

    async fn drag_mouse(&self, path: &[Point]) -> Result<(), ControlError> {
        let path: Vec<[u32; 2]> = path.iter().map(|p| [p.x, p.y]).collect();
        self.computer("drag_mouse", json!({ "path": path, "button": "left" }))
            .await
            .map(drop)
    }

    async fn scroll(&self, at: Point, delta_x: i32, delta_y: i32) -> Result<(), ControlError> {
        self.computer(
            "scroll",
            json!({ "x": at.x, "y": at.y, "delta_x": delta_x, "delta_y": delta_y }),
        )
        .await
        .map(drop)
    }

    async fn press_key(&self, combos: &[String]) -> Result<(), ControlError> {
        self.computer("press_key", json!({ "keys": combos }))
            .await
            .map(drop)
    }

    async fn type_text(&self, text: &str, delay_ms: u64) -> Result<(), ControlError> {
        self.computer("type", json!({ "text": text, "delay": delay_ms }))
            .await
            .map(drop)
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, ControlError> {
        let resp = self.computer("screenshot", json!({})).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ControlError::Transient(format!("failed to read screenshot: {}", e)))?;
        if bytes.is_empty() {
            return Err(ControlError::Transient("empty screenshot".into()));
        }
        Ok(bytes.to_vec())
    }

    async fn navigate(&self, url: &str) -> Result<(), ControlError> {
        // JSON string literals are valid JS string literals
        let code = format!(
            "await page.goto({}, {{ waitUntil: \"domcontentloaded\" }});",
            Value::String(url.to_string())
        );
        self.execute_playwright(&code).await.map(drop)
    }

    async fn current_url(&self) -> Result<Option<String>, ControlError> {
        let result = self
            .execute_playwright("return { url: page.url() };")
            .await?;
        Ok(result
            .as_ref()
            .and_then(|r| r.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}
