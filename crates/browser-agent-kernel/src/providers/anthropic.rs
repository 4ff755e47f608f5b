//! Anthropic Messages API with the computer-use tool.

use super::{assistant_calls, send_json, tool_calls_to_batch};
use anyhow::Result;
use async_trait::async_trait;
use browser_agent::{
    ContentBlock, Conversation, Message, ModelClient, RawAction, Role, Screenshot, StepStatus,
};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const TOOL_VERSION: &str = "computer_20250124";
const BETA_FLAG: &str = "computer-use-2025-01-24";

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    /// Display size announced to the tool when no screenshot is known yet
    display: (u32, u32),
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 4096,
            display: (1024, 768),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_display(mut self, width: u32, height: u32) -> Self {
        self.display = (width, height);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn request_body(&self, system_prompt: &str, conversation: &Conversation) -> Value {
        // Coordinates are pixels of the screenshots the model sees
        let (width, height) = conversation
            .latest_image()
            .and_then(|shot| shot.dimensions())
            .unwrap_or(self.display);

        let messages = anthropic_messages(conversation);

        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "tools": [{
                "type": TOOL_VERSION,
                "name": "computer",
                "display_width_px": width,
                "display_height_px": height,
            }],
            "messages": messages,
        });
        if !system_prompt.is_empty() {
            body["system"] = json!(system_prompt);
        }
        body
    }
}

// ===== Request =====

/// Replay the conversation with each executed batch as `tool_use` blocks and
/// the following observation as their `tool_result` blocks.
fn anthropic_messages(conversation: &Conversation) -> Vec<Value> {
    let mut messages = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    for (turn, message) in conversation.messages().iter().enumerate() {
        if let Some(batch) = assistant_calls(message) {
            let mut content = Vec::new();
            if let Some(reasoning) = batch.reasoning.filter(|text| !text.trim().is_empty()) {
                content.push(json!({ "type": "text", "text": reasoning }));
            }
            pending.clear();
            for (i, action) in batch.actions.into_iter().enumerate() {
                let id = format!("toolu_{turn:03}_{i:02}");
                let mut input = action.args;
                input.insert("action".to_string(), Value::String(action.name));
                content.push(json!({
                    "type": "tool_use",
                    "id": id,
                    "name": "computer",
                    "input": input,
                }));
                pending.push(id);
            }
            messages.push(json!({ "role": "assistant", "content": content }));
        } else if !pending.is_empty() && message.role != Role::Assistant {
            messages.push(tool_results(message, std::mem::take(&mut pending)));
        } else {
            pending.clear();
            messages.extend(anthropic_message(message));
        }
    }
    messages
}

/// One `tool_result` per call in order. The screenshot rides on the last
/// executed call; calls the loop never reached are reported as errors.
fn tool_results(message: &Message, ids: Vec<String>) -> Value {
    let mut ids = ids.into_iter();
    let mut results: Vec<Value> = Vec::new();
    let mut trailing: Vec<Value> = Vec::new();
    for block in &message.content {
        match block {
            ContentBlock::ActionResult { status, .. } => {
                let text = block.render().unwrap_or_default();
                match ids.next() {
                    Some(id) => results.push(json!({
                        "type": "tool_result",
                        "tool_use_id": id,
                        "content": [{ "type": "text", "text": text }],
                        "is_error": *status == StepStatus::Failed,
                    })),
                    None => trailing.push(json!({ "type": "text", "text": text })),
                }
            }
            ContentBlock::Image(shot) => match results
                .last_mut()
                .and_then(|result| result["content"].as_array_mut())
            {
                Some(content) => content.push(image_block(shot)),
                None => trailing.push(image_block(shot)),
            },
            ContentBlock::Text(text) if !text.trim().is_empty() => {
                trailing.push(json!({ "type": "text", "text": text }));
            }
            ContentBlock::Text(_) => {}
        }
    }
    for id in ids {
        results.push(json!({
            "type": "tool_result",
            "tool_use_id": id,
            "content": [{ "type": "text", "text": "not executed" }],
            "is_error": true,
        }));
    }
    results.extend(trailing);
    json!({ "role": "user", "content": results })
}

/// `None` for turns that would have no content, which the API rejects.
fn anthropic_message(message: &Message) -> Option<Value> {
    let role = match message.role {
        Role::Assistant => "assistant",
        Role::User | Role::Observation => "user",
    };
    let content: Vec<Value> = message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Image(shot) => Some(image_block(shot)),
            other => other
                .render()
                .filter(|text| !text.trim().is_empty())
                .map(|text| json!({ "type": "text", "text": text })),
        })
        .collect();
    (!content.is_empty()).then(|| json!({ "role": role, "content": content }))
}

fn image_block(shot: &Screenshot) -> Value {
    json!({
        "type": "image",
        "source": {
            "type": "base64",
            "media_type": shot.mime(),
            "data": shot.to_base64(),
        },
    })
}

// ===== Response =====

/// `tool_use` blocks become actions named by their `action` input.
fn response_to_batch(response: &Value) -> Result<String> {
    let mut actions = Vec::new();
    let mut prose = Vec::new();
    for block in response
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    prose.push(text.to_string());
                }
            }
            Some("tool_use") => {
                let mut input = block
                    .get("input")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                if let Some(Value::String(name)) = input.remove("action") {
                    actions.push(RawAction { name, args: input });
                }
            }
            _ => {}
        }
    }
    tool_calls_to_batch(actions, prose)
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn complete(&self, system_prompt: &str, conversation: &Conversation) -> Result<String> {
        info!(
            "[anthropic] Requesting completion from {} ({} messages)",
            self.model,
            conversation.len()
        );
        let request = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("anthropic-beta", BETA_FLAG)
            .json(&self.request_body(system_prompt, conversation));
        let response = send_json(request, "anthropic").await?;
        response_to_batch(&response)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use browser_agent::screenshot::solid_png;
    use browser_agent::Screenshot;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tool_use_blocks_become_actions() {
        let response = json!({
            "content": [
                { "type": "text", "text": "I'll open the menu." },
                { "type": "tool_use", "id": "t1", "name": "computer",
                  "input": { "action": "left_click", "coordinate": [640, 360] } },
                { "type": "tool_use", "id": "t2", "name": "computer",
                  "input": { "action": "key", "text": "Return" } },
            ],
            "stop_reason": "tool_use",
        });
        let batch = browser_agent::parser::parse(&response_to_batch(&response).unwrap()).unwrap();

        assert!(!batch.done);
        assert_eq!(batch.actions.len(), 2);
        assert_eq!(batch.actions[0].name, "left_click");
        assert_eq!(batch.actions[0].args["coordinate"], json!([640, 360]));
        assert!(!batch.actions[0].args.contains_key("action"));
        assert_eq!(batch.actions[1].args["text"], "Return");
        assert_eq!(batch.reasoning.as_deref(), Some("I'll open the menu."));
    }

    #[test]
    fn test_text_only_reply_is_final() {
        let response = json!({
            "content": [{ "type": "text", "text": "The store opens at 9am." }],
            "stop_reason": "end_turn",
        });
        let batch = browser_agent::parser::parse(&response_to_batch(&response).unwrap()).unwrap();
        assert!(batch.done);
        assert_eq!(batch.final_answer.as_deref(), Some("The store opens at 9am."));
    }

    #[test]
    fn test_request_uses_latest_screenshot_size() {
        let client = AnthropicClient::new("key", "claude").unwrap();
        let mut conversation = Conversation::new();
        conversation.append(Message::user("task"));
        conversation.append(Message::assistant(""));
        conversation.append(Message::observation(vec![ContentBlock::Image(
            Screenshot::from_bytes(solid_png(1280, 800, [1, 2, 3]).unwrap()),
        )]));

        let body = client.request_body("be careful", &conversation);
        assert_eq!(body["system"], "be careful");
        assert_eq!(body["tools"][0]["display_width_px"], 1280);
        assert_eq!(body["tools"][0]["display_height_px"], 800);

        // empty assistant turn is dropped
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["content"][0]["type"], "image");
        assert_eq!(messages[1]["content"][0]["source"]["media_type"], "image/png");
    }

    #[test]
    fn test_executed_batch_replays_as_tool_use_and_tool_result() {
        let client = AnthropicClient::new("key", "claude").unwrap();
        let mut conversation = Conversation::new();
        conversation.append(Message::user("Task: open the docs"));
        let reply = json!({
            "content": [
                { "type": "text", "text": "Opening the menu." },
                { "type": "tool_use", "id": "x", "name": "computer",
                  "input": { "action": "left_click", "coordinate": [640, 360] } },
                { "type": "tool_use", "id": "y", "name": "computer",
                  "input": { "action": "key", "text": "Return" } },
            ],
        });
        conversation.append(Message::assistant(response_to_batch(&reply).unwrap()));
        conversation.append(Message::observation(vec![
            ContentBlock::ActionResult {
                action: browser_agent::ActionKind::Click,
                status: StepStatus::Success,
                detail: "ok".into(),
                state_changed: Some(true),
                url: Some("https://docs.example.com/".into()),
            },
            ContentBlock::Image(Screenshot::from_bytes(solid_png(8, 8, [1, 2, 3]).unwrap())),
        ]));

        let body = client.request_body("", &conversation);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);

        let assistant = &messages[1];
        assert_eq!(assistant["role"], "assistant");
        assert_eq!(assistant["content"][0], json!({ "type": "text", "text": "Opening the menu." }));
        assert_eq!(assistant["content"][1]["type"], "tool_use");
        assert_eq!(
            assistant["content"][1]["input"],
            json!({ "action": "left_click", "coordinate": [640, 360] })
        );
        assert_eq!(assistant["content"][2]["input"]["action"], "key");

        let results = messages[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["type"], "tool_result");
        assert_eq!(results[0]["tool_use_id"], assistant["content"][1]["id"]);
        assert_eq!(results[0]["is_error"], false);
        let text: Value =
            serde_json::from_str(results[0]["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(text["url"], "https://docs.example.com/");
        assert_eq!(results[0]["content"][1]["type"], "image");

        // the key press never ran
        assert_eq!(results[1]["tool_use_id"], assistant["content"][2]["id"]);
        assert_eq!(results[1]["is_error"], true);
        assert!(body.get("system").is_none());
    }
}
