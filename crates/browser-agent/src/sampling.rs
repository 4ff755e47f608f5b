//! The sampling loop: ask the model, parse its batch, run each action in
//! order, fold the results back into the conversation, repeat until the
//! model stops, fails, or the iteration budget runs out.

use crate::action::{Action, ActionKind};
use crate::config::LoopConfig;
use crate::conversation::{ContentBlock, Conversation, Message, StepStatus};
use crate::coordinates::{CoordinateSpace, Point, SourceSpace};
use crate::error::{FatalExecutionError, VisionError};
use crate::executor::{ActionExecutor, ExecutionOutcome};
use crate::model::ModelClient;
use crate::normalizer::{ActionNormalizer, NormalizeContext, NORMALIZED_SCALE};
use crate::parser::{self, ActionBatch, AnswerRejection};
use crate::prompt;
use crate::screenshot::{state_changed, Screenshot};
use crate::vision::VisionService;
use chrono::Local;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ===== Public Types =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Running,
    AwaitingRetryAfterInvalidResponse,
    Done(String),
    Failed(String),
    MaxIterationsReached,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoopState::Done(_) | LoopState::Failed(_) | LoopState::MaxIterationsReached
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Stopped,
    Failed,
    MaxIterationsReached,
}

/// One executed (or rejected) action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// Step number (1-indexed, across all iterations)
    pub step: u32,
    /// Loop iteration the step belongs to
    pub iteration: u32,
    pub action: ActionKind,
    pub status: StepStatus,
    pub detail: String,
    /// Whether the screenshot differs from the previous one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_changed: Option<bool>,
    /// Answer of local vision and page queries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoopResult {
    /// Identifier for correlating logs, e.g. "20251205_134500_anthropic_1a2b3c4d"
    pub execution_id: String,
    pub task: String,
    pub final_answer: Option<String>,
    pub termination: TerminationReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Model calls that counted against the budget
    pub iterations: u32,
    pub step_log: Vec<StepRecord>,
    #[serde(skip)]
    pub conversation: Conversation,
}

/// Callback for progress updates, invoked once per step record.
pub type StepCallback = Box<dyn Fn(&StepRecord) + Send + Sync>;

// ===== Loop-local State =====

/// Everything one invocation threads through its iterations.
struct RunState {
    conversation: Conversation,
    space: CoordinateSpace,
    last_pointer: Option<Point>,
    last_located: Option<Point>,
    last_screenshot: Option<Screenshot>,
    /// Most recent URL reported by a page_info action
    last_page_url: Option<String>,
    /// Most recent URL seen from any action, attached to action results
    page_url: Option<String>,
    step_log: Vec<StepRecord>,
    iteration: u32,
}

impl RunState {
    fn context(&self) -> NormalizeContext {
        NormalizeContext {
            space: self.space,
            last_pointer: self.last_pointer,
            last_located: self.last_located,
        }
    }

    /// Remember a fresh capture and adopt its dimensions as the viewport.
    fn observe(&mut self, shot: &Screenshot) -> bool {
        let changed = state_changed(self.last_screenshot.as_ref(), shot);
        if let Some((width, height)) = shot.dimensions() {
            if (width, height) != (self.space.width(), self.space.height()) {
                match self.space.resize(width, height) {
                    Ok(()) => debug!("[sampling_loop] Viewport is now {}x{}", width, height),
                    Err(e) => debug!("[sampling_loop] Ignoring screenshot dimensions: {}", e),
                }
            }
        }
        self.last_screenshot = Some(shot.clone());
        changed
    }
}

/// What one action contributed to the batch.
enum StepEffect {
    Continue,
    Stop(Option<String>),
    Fail(String),
}

/// Leading `max_chars` characters of `text`, for log lines.
fn head(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

// ===== Sampling Loop =====

pub struct SamplingLoop {
    model: Arc<dyn ModelClient>,
    executor: ActionExecutor,
    vision: Option<Arc<dyn VisionService>>,
    normalizer: ActionNormalizer,
    config: LoopConfig,
    on_step: Option<StepCallback>,
}

impl SamplingLoop {
    pub fn new(model: Arc<dyn ModelClient>, executor: ActionExecutor, config: LoopConfig) -> Self {
        let normalizer =
            ActionNormalizer::new(config.vendor).with_document_scroll(config.document_scroll_px);
        Self {
            model,
            executor,
            vision: None,
            normalizer,
            config,
            on_step: None,
        }
    }

    pub fn with_vision(mut self, vision: Arc<dyn VisionService>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_step_callback(mut self, on_step: StepCallback) -> Self {
        self.on_step = Some(on_step);
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run the loop for one task.
    ///
    /// Every exit path yields a [`LoopResult`] except an invalid remote
    /// session, which is returned as [`FatalExecutionError`].
    pub async fn run(&self, task: &str) -> Result<LoopResult, FatalExecutionError> {
        let execution_id = format!(
            "{}_{}_{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            self.model.name(),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let max_iterations = self.config.max_iterations;

        info!(
            "[sampling_loop] Starting {} for task: {} (max_iterations: {})",
            execution_id,
            head(task, 100),
            max_iterations
        );

        let mut run = RunState {
            conversation: Conversation::new(),
            space: CoordinateSpace::default(),
            last_pointer: None,
            last_located: None,
            last_screenshot: None,
            last_page_url: None,
            page_url: None,
            step_log: Vec::new(),
            iteration: 0,
        };
        run.conversation.append(Message::user(prompt::task_message(task)));

        if self.config.initial_screenshot {
            match self.executor.capture().await? {
                Ok(shot) => {
                    run.observe(&shot);
                    run.conversation.append(Message::observation(vec![
                        ContentBlock::Text("Current screen.".to_string()),
                        ContentBlock::Image(shot),
                    ]));
                }
                Err(e) => warn!("[sampling_loop] Initial screenshot failed: {}", e),
            }
        }

        let mut state = LoopState::Running;
        while !state.is_terminal() {
            if state == LoopState::Running {
                if run.iteration >= max_iterations {
                    state = LoopState::MaxIterationsReached;
                    break;
                }
                run.iteration += 1;
                info!(
                    "[sampling_loop] Iteration {}/{}",
                    run.iteration, max_iterations
                );
            }
            run.conversation.prune_old_images(self.config.keep_images);

            let raw = match self
                .model
                .complete(&self.config.system_prompt, &run.conversation)
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("[sampling_loop] Model call failed: {}", e);
                    state = LoopState::Failed(format!("model call failed: {e}"));
                    continue;
                }
            };
            debug!("[sampling_loop] Model response: {}", head(&raw, 500));
            run.conversation.append(Message::assistant(raw.clone()));

            let batch = match parser::parse(&raw) {
                Ok(batch) => batch,
                Err(e) if state == LoopState::AwaitingRetryAfterInvalidResponse => {
                    warn!("[sampling_loop] Response still unparseable: {}", e);
                    state = LoopState::Failed(format!("model response could not be parsed: {e}"));
                    continue;
                }
                Err(e) => {
                    warn!("[sampling_loop] Unparseable response, asking once more: {}", e);
                    run.conversation
                        .append(Message::user(prompt::INVALID_OUTPUT_CORRECTION));
                    state = LoopState::AwaitingRetryAfterInvalidResponse;
                    continue;
                }
            };

            state = self.run_batch(&mut run, batch).await?;
        }

        let (termination, final_answer, failure_reason) = match state {
            LoopState::Done(answer) => (TerminationReason::Stopped, Some(answer), None),
            LoopState::Failed(reason) => (TerminationReason::Failed, None, Some(reason)),
            _ => (TerminationReason::MaxIterationsReached, None, None),
        };

        info!(
            "[sampling_loop] {} finished: {:?} after {} iteration(s), {} step(s)",
            execution_id,
            termination,
            run.iteration,
            run.step_log.len()
        );

        Ok(LoopResult {
            execution_id,
            task: task.to_string(),
            final_answer,
            termination,
            failure_reason,
            iterations: run.iteration,
            step_log: run.step_log,
            conversation: run.conversation,
        })
    }

    /// Execute a parsed batch in order and decide the next state.
    async fn run_batch(
        &self,
        run: &mut RunState,
        batch: ActionBatch,
    ) -> Result<LoopState, FatalExecutionError> {
        let mut blocks: Vec<ContentBlock> = Vec::new();
        let mut latest_image: Option<Screenshot> = None;
        let mut next = LoopState::Running;
        let mut answer_checked = false;

        for raw in &batch.actions {
            let action = match self.normalizer.normalize(&raw.name, &raw.args, &run.context()) {
                Ok(action) => action,
                Err(e) => {
                    warn!("[sampling_loop] Rejected {}: {}", raw.name, e);
                    self.record(
                        run,
                        &mut blocks,
                        e.kind,
                        StepStatus::Failed,
                        e.to_string(),
                        None,
                        None,
                    );
                    if self.config.strict {
                        next = LoopState::Failed(format!("invalid action: {e}"));
                        break;
                    }
                    continue;
                }
            };

            match self
                .apply(run, &action, &mut blocks, &mut latest_image)
                .await?
            {
                StepEffect::Continue => {}
                StepEffect::Fail(reason) => {
                    next = LoopState::Failed(reason);
                    break;
                }
                StepEffect::Stop(answer) => {
                    answer_checked = true;
                    if let Some(answer) = self.accept_answer(run, answer.as_deref(), &mut blocks) {
                        next = LoopState::Done(answer);
                    }
                    break;
                }
            }
        }

        if next == LoopState::Running && batch.done && !answer_checked {
            if let Some(answer) =
                self.accept_answer(run, batch.final_answer.as_deref(), &mut blocks)
            {
                next = LoopState::Done(answer);
            }
        }

        if blocks.is_empty() && latest_image.is_none() && next == LoopState::Running {
            blocks.push(ContentBlock::Text(
                "No actions were executed. Return the next actions or finish.".to_string(),
            ));
        }
        if let Some(shot) = latest_image {
            blocks.push(ContentBlock::Image(shot));
        }
        if !blocks.is_empty() {
            run.conversation.append(Message::observation(blocks));
        }
        Ok(next)
    }

    /// Run one normalized action, remote or local.
    async fn apply(
        &self,
        run: &mut RunState,
        action: &Action,
        blocks: &mut Vec<ContentBlock>,
        latest_image: &mut Option<Screenshot>,
    ) -> Result<StepEffect, FatalExecutionError> {
        let kind = action.kind();
        match action {
            Action::Stop { final_answer } => return Ok(StepEffect::Stop(final_answer.clone())),
            Action::Fail { reason } => {
                self.record(run, blocks, kind, StepStatus::Failed, reason.clone(), None, None);
                return Ok(StepEffect::Fail(reason.clone()));
            }
            Action::Wait { duration_ms } => {
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                self.record(
                    run,
                    blocks,
                    kind,
                    StepStatus::Success,
                    format!("waited {duration_ms} ms"),
                    None,
                    None,
                );
            }
            Action::PageInfo => {
                let url = self.executor.current_url().await?;
                match url {
                    Some(url) => {
                        run.last_page_url = Some(url.clone());
                        run.page_url = Some(url.clone());
                        self.record(
                            run,
                            blocks,
                            kind,
                            StepStatus::Success,
                            "current page".to_string(),
                            None,
                            Some(url),
                        );
                    }
                    None => self.record(
                        run,
                        blocks,
                        kind,
                        StepStatus::Failed,
                        "current URL is unavailable".to_string(),
                        None,
                        None,
                    ),
                }
            }
            Action::Query { .. } | Action::Caption { .. } | Action::Locate { .. } => {
                match self.vision_step(run, action).await? {
                    Ok(output) => self.record(
                        run,
                        blocks,
                        kind,
                        StepStatus::Success,
                        "ok".to_string(),
                        None,
                        Some(output),
                    ),
                    Err(e) => {
                        warn!("[sampling_loop] {} failed: {}", kind, e);
                        self.record(
                            run,
                            blocks,
                            kind,
                            StepStatus::Failed,
                            e.to_string(),
                            None,
                            None,
                        );
                    }
                }
            }
            remote => {
                let result = self.executor.execute(remote).await?;
                match result.outcome {
                    ExecutionOutcome::Captured(shot) => {
                        let changed = run.observe(&shot);
                        if let Some(point) = remote.pointer_after() {
                            run.last_pointer = Some(point);
                        }
                        let detail = match &result.current_url {
                            Some(url) => format!("ok, page is {url}"),
                            None => "ok".to_string(),
                        };
                        if result.current_url.is_some() {
                            run.page_url = result.current_url.clone();
                        }
                        *latest_image = Some(shot);
                        self.record(
                            run,
                            blocks,
                            kind,
                            StepStatus::Success,
                            detail,
                            Some(changed),
                            None,
                        );
                    }
                    ExecutionOutcome::Error(message) => {
                        self.record(run, blocks, kind, StepStatus::Failed, message, None, None);
                    }
                }
            }
        }
        Ok(StepEffect::Continue)
    }

    /// Answer a vision action against the freshest screenshot.
    async fn vision_step(
        &self,
        run: &mut RunState,
        action: &Action,
    ) -> Result<Result<String, VisionError>, FatalExecutionError> {
        let Some(vision) = self.vision.as_ref() else {
            return Ok(Err(VisionError::Unavailable));
        };
        let shot = match run.last_screenshot.clone() {
            Some(shot) => shot,
            None => match self.executor.capture().await? {
                Ok(shot) => {
                    run.observe(&shot);
                    shot
                }
                Err(message) => {
                    return Ok(Err(VisionError::InvalidResponse(format!(
                        "no screenshot available: {message}"
                    ))))
                }
            },
        };

        let output = match action {
            Action::Query { question } => vision.query(&shot, question).await,
            Action::Caption { length } => vision.caption(&shot, *length).await,
            Action::Locate { object } => match vision.point(&shot, object).await {
                Ok(Some((x, y))) => match run
                    .space
                    .to_pixel_point(x, y, SourceSpace::UnitInterval)
                {
                    Ok(pixel) => {
                        run.last_located = Some(pixel);
                        let scale = f64::from(NORMALIZED_SCALE);
                        Ok(serde_json::json!({
                            "x_norm": (x * scale).round() as i64,
                            "y_norm": (y * scale).round() as i64,
                            "x": pixel.x,
                            "y": pixel.y,
                        })
                        .to_string())
                    }
                    Err(e) => Err(VisionError::InvalidResponse(e.to_string())),
                },
                Ok(None) => Err(VisionError::InvalidResponse(format!(
                    "no match for \"{object}\""
                ))),
                Err(e) => Err(e),
            },
            other => Err(VisionError::InvalidResponse(format!(
                "{} is not a vision action",
                other.kind()
            ))),
        };
        Ok(output)
    }

    /// Validate a declared final answer. A rejection is fed back as a
    /// correction and the loop keeps running.
    fn accept_answer(
        &self,
        run: &mut RunState,
        answer: Option<&str>,
        blocks: &mut Vec<ContentBlock>,
    ) -> Option<String> {
        let verdict = parser::validate_final_answer(answer).and_then(|answer| {
            parser::check_answer_urls(answer, run.last_page_url.as_deref()).map(|()| answer)
        });
        match verdict {
            Ok(answer) => {
                info!("[sampling_loop] Final answer accepted");
                self.record(
                    run,
                    blocks,
                    ActionKind::Stop,
                    StepStatus::Success,
                    "final answer accepted".to_string(),
                    None,
                    Some(answer.to_string()),
                );
                Some(answer.to_string())
            }
            Err(rejection) => {
                warn!("[sampling_loop] Final answer rejected: {}", rejection);
                self.reject_answer(run, blocks, rejection);
                None
            }
        }
    }

    fn reject_answer(
        &self,
        run: &mut RunState,
        blocks: &mut Vec<ContentBlock>,
        rejection: AnswerRejection,
    ) {
        self.record(
            run,
            blocks,
            ActionKind::Stop,
            StepStatus::Failed,
            rejection.to_string(),
            None,
            None,
        );
        blocks.push(ContentBlock::Text(rejection.correction().to_string()));
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        run: &mut RunState,
        blocks: &mut Vec<ContentBlock>,
        action: ActionKind,
        status: StepStatus,
        detail: String,
        state_changed: Option<bool>,
        output: Option<String>,
    ) {
        let record = StepRecord {
            step: run.step_log.len() as u32 + 1,
            iteration: run.iteration,
            action,
            status,
            detail,
            state_changed,
            output,
        };
        info!(
            "[sampling_loop] Step {}: {} {} ({})",
            record.step, record.action, record.status, record.detail
        );

        let mut result_detail = record.detail.clone();
        if let Some(output) = &record.output {
            result_detail = format!("{result_detail}: {output}");
        }
        blocks.push(ContentBlock::ActionResult {
            action,
            status,
            detail: result_detail,
            state_changed,
            url: run.page_url.clone(),
        });

        if let Some(callback) = &self.on_step {
            callback(&record);
        }
        run.step_log.push(record);
    }
}
