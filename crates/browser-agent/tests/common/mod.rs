//! Shared fakes for loop-level tests: a scripted model, a recording
//! browser, a recording pool and a fixed vision service.

#![allow(dead_code)]

use async_trait::async_trait;
use browser_agent::screenshot::solid_png;
use browser_agent::{
    ActionExecutor, BrowserControl, CaptionLength, ControlError, Conversation, ExecutorConfig,
    LoopConfig, ModelClient, MouseButton, Point, PoolError, Role, SamplingLoop, Screenshot,
    SessionHandle, SessionPool, VisionError, VisionService,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

// ===== Model =====

pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    /// Returned once the script runs out
    fallback: Option<String>,
    /// Image-bearing observation turns seen on each call
    image_turns: Mutex<Vec<usize>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            fallback: None,
            image_turns: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn repeating(response: &str) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(response.to_string()),
            image_turns: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn image_turns(&self) -> Vec<usize> {
        self.image_turns.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, _system: &str, conversation: &Conversation) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let with_images = conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Observation && m.has_image())
            .count();
        self.image_turns.lock().unwrap().push(with_images);

        let next = self.responses.lock().unwrap().pop_front();
        next.or_else(|| self.fallback.clone())
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ===== Browser =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigateBehavior {
    Succeed,
    AlwaysFail,
}

/// Records every primitive call. Screens are 1024x768 until the first
/// successful navigation, 2000x1000 afterwards; every capture gets a new
/// shade unless `static_screen` is set.
pub struct RecordingBrowser {
    calls: Mutex<Vec<String>>,
    navigate_attempts: Mutex<Vec<Instant>>,
    navigated: Mutex<Option<String>>,
    shade: AtomicU8,
    navigate_behavior: NavigateBehavior,
    fatal_on_click: bool,
    static_screen: bool,
}

impl Default for RecordingBrowser {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            navigate_attempts: Mutex::new(Vec::new()),
            navigated: Mutex::new(None),
            shade: AtomicU8::new(0),
            navigate_behavior: NavigateBehavior::Succeed,
            fatal_on_click: false,
            static_screen: false,
        }
    }
}

impl RecordingBrowser {
    pub fn with_navigate(mut self, behavior: NavigateBehavior) -> Self {
        self.navigate_behavior = behavior;
        self
    }

    /// Every click reports the session as gone.
    pub fn with_fatal_clicks(mut self) -> Self {
        self.fatal_on_click = true;
        self
    }

    /// Every capture returns identical bytes.
    pub fn with_static_screen(mut self) -> Self {
        self.static_screen = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn navigate_attempts(&self) -> Vec<Instant> {
        self.navigate_attempts.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BrowserControl for RecordingBrowser {
    async fn click_mouse(
        &self,
        at: Point,
        button: MouseButton,
        count: u8,
    ) -> Result<(), ControlError> {
        self.record(format!("click {} {} x{}", at, button.as_str(), count));
        if self.fatal_on_click {
            return Err(ControlError::SessionInvalid("410 browser deleted".into()));
        }
        Ok(())
    }

    async fn move_mouse(&self, at: Point) -> Result<(), ControlError> {
        self.record(format!("move {at}"));
        Ok(())
    }

    async fn drag_mouse(&self, path: &[Point]) -> Result<(), ControlError> {
        let points: Vec<String> = path.iter().map(|p| p.to_string()).collect();
        self.record(format!("drag {}", points.join(" -> ")));
        Ok(())
    }

    async fn scroll(&self, at: Point, delta_x: i32, delta_y: i32) -> Result<(), ControlError> {
        self.record(format!("scroll {at} {delta_x} {delta_y}"));
        Ok(())
    }

    async fn press_key(&self, combos: &[String]) -> Result<(), ControlError> {
        self.record(format!("key {}", combos.join(" ")));
        Ok(())
    }

    async fn type_text(&self, text: &str, _delay_ms: u64) -> Result<(), ControlError> {
        self.record(format!("type {text}"));
        Ok(())
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, ControlError> {
        let (w, h) = if self.navigated.lock().unwrap().is_some() {
            (2000, 1000)
        } else {
            (1024, 768)
        };
        let shade = if self.static_screen {
            0
        } else {
            self.shade.fetch_add(1, Ordering::SeqCst)
        };
        Ok(solid_png(w, h, [shade, 0, 0]).unwrap())
    }

    async fn navigate(&self, url: &str) -> Result<(), ControlError> {
        self.record(format!("navigate {url}"));
        self.navigate_attempts.lock().unwrap().push(Instant::now());
        match self.navigate_behavior {
            NavigateBehavior::Succeed => {
                *self.navigated.lock().unwrap() = Some(url.to_string());
                Ok(())
            }
            NavigateBehavior::AlwaysFail => {
                Err(ControlError::Transient("net::ERR_CONNECTION_RESET".into()))
            }
        }
    }

    async fn current_url(&self) -> Result<Option<String>, ControlError> {
        Ok(self.navigated.lock().unwrap().clone())
    }
}

// ===== Pool =====

pub struct RecordingPool {
    next: AtomicUsize,
    releases: Mutex<Vec<(String, bool)>>,
    browser: Arc<RecordingBrowser>,
}

impl RecordingPool {
    pub fn new(browser: Arc<RecordingBrowser>) -> Arc<Self> {
        Arc::new(Self {
            next: AtomicUsize::new(0),
            releases: Mutex::new(Vec::new()),
            browser,
        })
    }

    pub fn releases(&self) -> Vec<(String, bool)> {
        self.releases.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionPool for RecordingPool {
    async fn acquire(&self) -> Result<SessionHandle, PoolError> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(SessionHandle {
            id: format!("browser-{n}"),
            browser: self.browser.clone(),
        })
    }

    async fn release(&self, session_id: &str, reuse: bool) -> Result<(), PoolError> {
        self.releases
            .lock()
            .unwrap()
            .push((session_id.to_string(), reuse));
        Ok(())
    }
}

// ===== Vision =====

/// Answers every point lookup with the same unit-space location.
pub struct FixedVision {
    pub point: Option<(f64, f64)>,
}

#[async_trait]
impl VisionService for FixedVision {
    async fn query(&self, _image: &Screenshot, question: &str) -> Result<String, VisionError> {
        Ok(format!("answer to: {question}"))
    }

    async fn point(
        &self,
        _image: &Screenshot,
        _object: &str,
    ) -> Result<Option<(f64, f64)>, VisionError> {
        Ok(self.point)
    }

    async fn caption(
        &self,
        _image: &Screenshot,
        length: CaptionLength,
    ) -> Result<String, VisionError> {
        Ok(format!("a {} caption", length.as_str()))
    }
}

// ===== Builders =====

pub fn fast_executor(browser: Arc<dyn BrowserControl>) -> ActionExecutor {
    ActionExecutor::new(
        browser,
        ExecutorConfig {
            settle_delay: Duration::from_millis(5),
            ..Default::default()
        },
    )
}

pub fn sampling_loop(
    model: Arc<ScriptedModel>,
    browser: Arc<dyn BrowserControl>,
    config: LoopConfig,
) -> SamplingLoop {
    SamplingLoop::new(model, fast_executor(browser), config)
}
