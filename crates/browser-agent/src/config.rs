//! Loop and executor configuration.
//!
//! Defaults are usable as-is; `AgentConfig::from_env()` overlays the
//! `BROWSER_AGENT_*` environment variables on top of them.

use crate::keys::KeyConvention;
use crate::normalizer::{Vendor, DEFAULT_DOCUMENT_SCROLL};
use crate::prompt;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MAX_ITERATIONS: u32 = 50;
pub const DEFAULT_KEEP_IMAGES: usize = 3;
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_TYPING_DELAY_MS: u64 = 12;

// ===== Retry =====

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after each further failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff after the failed attempt with 0-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

// ===== Executor =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Wait between an action and its screenshot
    pub settle_delay: Duration,
    /// Per-character delay passed to the remote typer
    pub typing_delay_ms: u64,
    pub navigate_retry: RetryPolicy,
    /// Key naming the remote backend understands
    pub key_convention: KeyConvention,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            typing_delay_ms: DEFAULT_TYPING_DELAY_MS,
            navigate_retry: RetryPolicy::default(),
            key_convention: KeyConvention::X11,
        }
    }
}

// ===== Loop =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Action vocabulary the model speaks
    pub vendor: Vendor,
    pub max_iterations: u32,
    /// Number of most recent image-bearing turns that keep their images
    pub keep_images: usize,
    /// Treat validation errors as fatal
    pub strict: bool,
    pub system_prompt: String,
    /// Capture a screenshot before the first model call
    pub initial_screenshot: bool,
    /// Pixels scrolled by `scroll_document` without a magnitude
    pub document_scroll_px: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            vendor: Vendor::JsonBatch,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            keep_images: DEFAULT_KEEP_IMAGES,
            strict: false,
            system_prompt: prompt::JSON_BATCH_SYSTEM_PROMPT.to_string(),
            initial_screenshot: false,
            document_scroll_px: DEFAULT_DOCUMENT_SCROLL,
        }
    }
}

impl LoopConfig {
    /// Defaults with the system prompt that fits the vendor's vocabulary.
    /// Yutori n1 ships its own system prompt, so none is sent.
    pub fn for_vendor(vendor: Vendor) -> Self {
        let system_prompt = match vendor {
            Vendor::Gemini => prompt::GEMINI_SYSTEM_PROMPT,
            Vendor::JsonBatch => prompt::JSON_BATCH_SYSTEM_PROMPT,
            Vendor::Anthropic => prompt::ANTHROPIC_SYSTEM_PROMPT,
            Vendor::OpenAi => prompt::OPENAI_SYSTEM_PROMPT,
            Vendor::Yutori => "",
        };
        Self {
            vendor,
            system_prompt: system_prompt.to_string(),
            ..Default::default()
        }
    }
}

// ===== Combined =====

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub sampling: LoopConfig,
    pub executor: ExecutorConfig,
}

impl AgentConfig {
    /// Defaults overlaid with `BROWSER_AGENT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AgentConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = parsed::<Vendor>(&lookup, "BROWSER_AGENT_VENDOR") {
            config.sampling = LoopConfig::for_vendor(v);
        }
        if let Some(v) = parsed::<u32>(&lookup, "BROWSER_AGENT_MAX_ITERATIONS") {
            config.sampling.max_iterations = v;
        }
        if let Some(v) = parsed::<usize>(&lookup, "BROWSER_AGENT_KEEP_IMAGES") {
            config.sampling.keep_images = v;
        }
        if let Some(v) = flag(&lookup, "BROWSER_AGENT_STRICT") {
            config.sampling.strict = v;
        }
        if let Some(v) = parsed::<u64>(&lookup, "BROWSER_AGENT_SETTLE_MS") {
            config.executor.settle_delay = Duration::from_millis(v);
        }
        if let Some(v) = parsed::<u32>(&lookup, "BROWSER_AGENT_NAVIGATE_RETRIES") {
            config.executor.navigate_retry.max_attempts = v.max(1);
        }
        config
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("[config] Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let raw = lookup(key)?;
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => {
            warn!("[config] Ignoring {}={:?}: expected true or false", key, raw);
            None
        }
    }
}
