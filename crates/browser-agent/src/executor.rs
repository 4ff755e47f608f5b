//! Remote action execution.
//!
//! [`ActionExecutor`] turns a normalized [`Action`] into calls on a
//! [`BrowserControl`] backend, waits for the page to settle and captures a
//! screenshot. Remote failures become data in the [`ExecutionResult`];
//! only an invalid session escapes as [`FatalExecutionError`].

use crate::action::{Action, MouseButton};
use crate::config::ExecutorConfig;
use crate::coordinates::Point;
use crate::error::{ControlError, FatalExecutionError};
use crate::keys::format_combo;
use crate::screenshot::Screenshot;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Gap between the focusing click and the keystrokes of a type action.
const FOCUS_DELAY: Duration = Duration::from_millis(100);

// ===== Backend Trait =====

/// Primitive operations of a remote browser.
///
/// Implementations classify failures: [`ControlError::SessionInvalid`] when
/// the session is gone or unauthenticated, [`ControlError::Transient`]
/// otherwise.
#[async_trait]
pub trait BrowserControl: Send + Sync {
    async fn click_mouse(
        &self,
        at: Point,
        button: MouseButton,
        count: u8,
    ) -> Result<(), ControlError>;

    async fn move_mouse(&self, at: Point) -> Result<(), ControlError>;

    /// Press at the first point, move through the rest, release at the last.
    async fn drag_mouse(&self, path: &[Point]) -> Result<(), ControlError>;

    async fn scroll(&self, at: Point, delta_x: i32, delta_y: i32) -> Result<(), ControlError>;

    /// Press key combinations, each already rendered for the backend
    /// (for example `"ctrl+a"` or `"Return"`).
    async fn press_key(&self, combos: &[String]) -> Result<(), ControlError>;

    async fn type_text(&self, text: &str, delay_ms: u64) -> Result<(), ControlError>;

    /// Encoded image of the current viewport.
    async fn capture_screenshot(&self) -> Result<Vec<u8>, ControlError>;

    async fn navigate(&self, url: &str) -> Result<(), ControlError>;

    /// URL of the active page, when the backend can report it.
    async fn current_url(&self) -> Result<Option<String>, ControlError> {
        Ok(None)
    }
}

// ===== Results =====

/// Either a post-action screenshot or the reason the action failed.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Captured(Screenshot),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub outcome: ExecutionOutcome,
    /// Page URL after navigation-type actions
    pub current_url: Option<String>,
    /// Remote attempts made; above 1 only for retried navigation
    pub attempts: u32,
}

impl ExecutionResult {
    fn captured(screenshot: Screenshot, current_url: Option<String>, attempts: u32) -> Self {
        Self {
            outcome: ExecutionOutcome::Captured(screenshot),
            current_url,
            attempts,
        }
    }

    fn error(message: impl Into<String>, attempts: u32) -> Self {
        Self {
            outcome: ExecutionOutcome::Error(message.into()),
            current_url: None,
            attempts,
        }
    }

    pub fn screenshot(&self) -> Option<&Screenshot> {
        match &self.outcome {
            ExecutionOutcome::Captured(shot) => Some(shot),
            ExecutionOutcome::Error(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            ExecutionOutcome::Captured(_) => None,
            ExecutionOutcome::Error(message) => Some(message),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Captured(_))
    }
}

// ===== Executor =====

/// Splits a control failure into data (transient) and a loop-ending error.
fn classify(err: ControlError) -> Result<String, FatalExecutionError> {
    match err {
        ControlError::Transient(message) => Ok(message),
        fatal @ ControlError::SessionInvalid(_) => Err(fatal.into()),
    }
}

pub struct ActionExecutor {
    browser: Arc<dyn BrowserControl>,
    config: ExecutorConfig,
}

impl ActionExecutor {
    pub fn new(browser: Arc<dyn BrowserControl>, config: ExecutorConfig) -> Self {
        Self { browser, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run one remote action, then settle and capture.
    ///
    /// The result always carries exactly one of a screenshot or an error.
    pub async fn execute(&self, action: &Action) -> Result<ExecutionResult, FatalExecutionError> {
        if !action.is_remote() {
            return Ok(ExecutionResult::error(
                format!("{} is not a remote action", action.kind()),
                0,
            ));
        }

        info!("[executor] {} {:?}", action.kind(), action);

        let attempts = match action {
            Action::Navigate { url } => match self.navigate_with_retry(url).await? {
                Ok(attempts) => attempts,
                Err(result) => return Ok(result),
            },
            other => {
                if let Err(err) = self.dispatch(other).await {
                    let message = classify(err)?;
                    warn!("[executor] {} failed: {}", other.kind(), message);
                    return Ok(ExecutionResult::error(
                        format!("{} failed: {}", other.kind(), message),
                        1,
                    ));
                }
                1
            }
        };

        tokio::time::sleep(self.config.settle_delay).await;

        let screenshot = match self.capture().await? {
            Ok(shot) => shot,
            Err(message) => {
                return Ok(ExecutionResult::error(
                    format!("screenshot after {} failed: {}", action.kind(), message),
                    attempts,
                ))
            }
        };

        let current_url = match action {
            Action::Navigate { .. } | Action::GoBack | Action::GoForward => {
                self.current_url().await?
            }
            _ => None,
        };

        Ok(ExecutionResult::captured(screenshot, current_url, attempts))
    }

    /// Capture the viewport without acting. Transient failures come back as
    /// the inner error.
    pub async fn capture(&self) -> Result<Result<Screenshot, String>, FatalExecutionError> {
        match self.browser.capture_screenshot().await {
            Ok(bytes) => {
                let shot = Screenshot::from_bytes(bytes);
                debug!("[executor] Captured {:?}", shot);
                Ok(Ok(shot))
            }
            Err(err) => {
                let message = classify(err)?;
                warn!("[executor] Screenshot failed: {}", message);
                Ok(Err(message))
            }
        }
    }

    /// Current page URL. Transient failures are logged and read as unknown.
    pub async fn current_url(&self) -> Result<Option<String>, FatalExecutionError> {
        match self.browser.current_url().await {
            Ok(url) => Ok(url),
            Err(err) => {
                let message = classify(err)?;
                warn!("[executor] Could not read current URL: {}", message);
                Ok(None)
            }
        }
    }

    /// Inner `Ok` is the attempt count of the successful navigation; inner
    /// `Err` is the exhausted-retry result.
    async fn navigate_with_retry(
        &self,
        url: &str,
    ) -> Result<Result<u32, ExecutionResult>, FatalExecutionError> {
        let policy = self.config.navigate_retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            match self.browser.navigate(url).await {
                Ok(()) => {
                    if attempt > 0 {
                        info!(
                            "[executor] Navigation to {} succeeded on attempt {}",
                            url,
                            attempt + 1
                        );
                    }
                    return Ok(Ok(attempt + 1));
                }
                Err(err) => {
                    last_error = classify(err)?;
                    if attempt + 1 < max_attempts {
                        let delay = policy.delay_for(attempt);
                        warn!(
                            "[executor] Navigation attempt {}/{} to {} failed: {} (retrying in {:?})",
                            attempt + 1,
                            max_attempts,
                            url,
                            last_error,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        warn!(
            "[executor] Navigation to {} failed after {} attempts: {}",
            url, max_attempts, last_error
        );
        Ok(Err(ExecutionResult::error(
            format!(
                "navigation to {} failed after {} attempts: {}",
                url, max_attempts, last_error
            ),
            max_attempts,
        )))
    }

    fn combo(&self, keys: &[&str]) -> String {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        format_combo(&keys, self.config.key_convention)
    }

    async fn dispatch(&self, action: &Action) -> Result<(), ControlError> {
        let browser = &self.browser;
        match action {
            Action::Click { at, button, count } => browser.click_mouse(*at, *button, *count).await,
            Action::DoubleClick { at } => browser.click_mouse(*at, MouseButton::Left, 2).await,
            Action::TripleClick { at } => browser.click_mouse(*at, MouseButton::Left, 3).await,
            Action::Hover { at } => browser.move_mouse(*at).await,
            Action::TypeText {
                at,
                text,
                clear_first,
                press_enter_after,
            } => {
                if let Some(at) = at {
                    browser.click_mouse(*at, MouseButton::Left, 1).await?;
                    tokio::time::sleep(FOCUS_DELAY).await;
                }
                if *clear_first {
                    browser.press_key(&[self.combo(&["ctrl", "a"])]).await?;
                }
                browser.type_text(text, self.config.typing_delay_ms).await?;
                if *press_enter_after {
                    browser.press_key(&[self.combo(&["enter"])]).await?;
                }
                Ok(())
            }
            Action::KeyCombo { keys } => {
                browser
                    .press_key(&[format_combo(keys, self.config.key_convention)])
                    .await
            }
            Action::ScrollAt {
                at,
                delta_x,
                delta_y,
            } => browser.scroll(*at, *delta_x, *delta_y).await,
            Action::ScrollDocument {
                direction,
                magnitude,
            } => {
                // Viewports larger than i32::MAX pixels do not exist.
                let magnitude = i32::try_from(*magnitude).unwrap_or(i32::MAX);
                let (dx, dy) = direction.deltas(magnitude);
                let center = self.viewport_center().await?;
                browser.scroll(center, dx, dy).await
            }
            Action::Drag { start, end } => browser.drag_mouse(&[*start, *end]).await,
            Action::GoBack => browser.press_key(&[self.combo(&["alt", "Left"])]).await,
            Action::GoForward => browser.press_key(&[self.combo(&["alt", "Right"])]).await,
            Action::Screenshot => Ok(()),
            Action::Navigate { url } => browser.navigate(url).await,
            Action::Wait { .. }
            | Action::Query { .. }
            | Action::Stop { .. }
            | Action::Fail { .. }
            | Action::Locate { .. }
            | Action::Caption { .. }
            | Action::PageInfo => Ok(()),
        }
    }

    /// Center of the live viewport, from a fresh capture when the backend
    /// reports image dimensions.
    async fn viewport_center(&self) -> Result<Point, ControlError> {
        let bytes = self.browser.capture_screenshot().await?;
        let center = match Screenshot::from_bytes(bytes).dimensions() {
            Some((w, h)) if w > 0 && h > 0 => Point::new(w / 2, h / 2),
            _ => crate::coordinates::CoordinateSpace::default().center(),
        };
        Ok(center)
    }
}
