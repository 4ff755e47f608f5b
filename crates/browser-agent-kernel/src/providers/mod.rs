//! Model vendors behind [`browser_agent::ModelClient`].
//!
//! Every client returns text the response parser understands. Tool-calling
//! vendors (Anthropic, Gemini) have their tool calls rewritten as a JSON
//! action batch; a reply with no tool call at all is treated as the model
//! being done, with its prose as the final answer. Prose that spells out an
//! action batch is rejected by the loop's final answer check and sent back.

pub mod anthropic;
pub mod gemini;
pub mod openai_compat;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai_compat::OpenAiCompatClient;

use crate::preview;
use anyhow::{anyhow, Result};
use browser_agent::{ActionBatch, Message, RawAction, Role};
use serde_json::Value;
use tracing::{debug, warn};

/// Send a prepared request and decode the JSON body, reporting non-2xx
/// responses with their body text.
pub(crate) async fn send_json(request: reqwest::RequestBuilder, vendor: &str) -> Result<Value> {
    let resp = request.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        warn!("[{}] API error: {} - {}", vendor, status, preview(&text));
        return Err(anyhow!("{} API error ({}): {}", vendor, status, text));
    }

    let response_text = resp.text().await?;
    debug!("[{}] Response: {}", vendor, preview(&response_text));
    serde_json::from_str(&response_text)
        .map_err(|e| anyhow!("Failed to parse {} response: {}", vendor, e))
}

/// Batch text for one turn of tool calls plus any prose around them.
pub(crate) fn tool_calls_to_batch(actions: Vec<RawAction>, prose: Vec<String>) -> Result<String> {
    let text = prose.join("\n").trim().to_string();
    let batch = if actions.is_empty() {
        if browser_agent::parser::is_action_batch(&text) {
            warn!("[provider] Reply wrote actions as text instead of tool calls");
        }
        ActionBatch {
            done: true,
            final_answer: (!text.is_empty()).then_some(text),
            ..Default::default()
        }
    } else {
        ActionBatch {
            actions,
            reasoning: (!text.is_empty()).then_some(text),
            ..Default::default()
        }
    };
    Ok(serde_json::to_string(&batch)?)
}

/// The tool calls an assistant turn made, recovered from its batch text.
/// `None` for turns without calls, which replay as plain text.
pub(crate) fn assistant_calls(message: &Message) -> Option<ActionBatch> {
    if message.role != Role::Assistant {
        return None;
    }
    let batch = browser_agent::parser::parse(&message.text()).ok()?;
    (!batch.actions.is_empty()).then_some(batch)
}
