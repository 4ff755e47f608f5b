//! Conversation state for one loop invocation.
//!
//! Messages are append-only. The only mutation of existing messages is
//! [`Conversation::prune_old_images`], which drops image blocks from older
//! observation turns.

use crate::action::ActionKind;
use crate::screenshot::Screenshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// Results of executed actions, fed back to the model
    Observation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    Image(Screenshot),
    ActionResult {
        action: ActionKind,
        status: StepStatus,
        detail: String,
        /// `None` when the action produced no screenshot to compare
        state_changed: Option<bool>,
        /// Page the browser was on after the action, when known
        url: Option<String>,
    },
}

impl ContentBlock {
    pub fn is_image(&self) -> bool {
        matches!(self, ContentBlock::Image(_))
    }

    /// Textual rendering for models that only take text, and for logs.
    pub fn render(&self) -> Option<String> {
        match self {
            ContentBlock::Text(value) => Some(value.clone()),
            ContentBlock::Image(_) => None,
            ContentBlock::ActionResult {
                action,
                status,
                detail,
                state_changed,
                url,
            } => {
                let mut json = serde_json::json!({
                    "action": action.as_str(),
                    "status": status.as_str(),
                    "detail": detail,
                });
                if let Some(changed) = state_changed {
                    json["state_changed"] = serde_json::Value::Bool(*changed);
                }
                if let Some(url) = url {
                    json["url"] = serde_json::Value::String(url.clone());
                }
                Some(json.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::Text(text.into())])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentBlock::Text(text.into())])
    }

    pub fn observation(content: Vec<ContentBlock>) -> Self {
        Self::new(Role::Observation, content)
    }

    pub fn has_image(&self) -> bool {
        self.content.iter().any(ContentBlock::is_image)
    }

    pub fn images(&self) -> impl Iterator<Item = &Screenshot> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::Image(shot) => Some(shot),
            _ => None,
        })
    }

    /// All non-image blocks rendered and joined with newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Most recent screenshot still present in the history.
    pub fn latest_image(&self) -> Option<&Screenshot> {
        self.messages.iter().rev().find_map(|m| m.images().last())
    }

    /// Keep image blocks only in the `keep` most recent observation turns
    /// that have them. Text and result blocks stay; messages are never
    /// removed or reordered. Returns the number of turns stripped.
    pub fn prune_old_images(&mut self, keep: usize) -> usize {
        let mut seen = 0usize;
        let mut stripped = 0usize;
        for message in self.messages.iter_mut().rev() {
            if message.role != Role::Observation || !message.has_image() {
                continue;
            }
            seen += 1;
            if seen > keep {
                message.content.retain(|block| !block.is_image());
                stripped += 1;
            }
        }
        if stripped > 0 {
            debug!(
                "[conversation] Pruned images from {} older turn(s), kept {}",
                stripped, keep
            );
        }
        stripped
    }
}
