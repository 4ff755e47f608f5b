//! Browser Agent - computer-use sampling loop for remote browsers
//!
//! This crate turns loosely structured multimodal model output into
//! validated browser actions, runs them against a remote browser through the
//! [`BrowserControl`] trait, and feeds screenshots and results back to the
//! model until it stops, fails, or runs out of iterations.
//!
//! HTTP adapters for concrete backends and model vendors live in
//! `browser-agent-kernel`.

pub mod action;
pub mod config;
pub mod conversation;
pub mod coordinates;
pub mod error;
pub mod executor;
pub mod fanout;
pub mod keys;
pub mod logging;
pub mod model;
pub mod normalizer;
pub mod parser;
pub mod prompt;
pub mod sampling;
pub mod screenshot;
pub mod session;
pub mod vision;

pub use action::{Action, ActionKind, CaptionLength, MouseButton, ScrollDirection};
pub use config::{AgentConfig, ExecutorConfig, LoopConfig, RetryPolicy};
pub use conversation::{ContentBlock, Conversation, Message, Role, StepStatus};
pub use coordinates::{CoordinateSpace, Point, SourceSpace};
pub use error::{
    ControlError, CoordinateError, FatalExecutionError, ParseError, PoolError, SessionError,
    ValidationError, VisionError,
};
pub use executor::{ActionExecutor, BrowserControl, ExecutionOutcome, ExecutionResult};
pub use fanout::{run_all, TaskOutcome};
pub use keys::KeyConvention;
pub use model::ModelClient;
pub use normalizer::{ActionNormalizer, NormalizeContext, Vendor};
pub use parser::{ActionBatch, RawAction};
pub use sampling::{LoopResult, LoopState, SamplingLoop, StepRecord, TerminationReason};
pub use screenshot::Screenshot;
pub use session::{with_session, Lease, SessionHandle, SessionPool};
pub use vision::VisionService;
