//! Gemini `generateContent` with the browser computer-use tool.

use super::{assistant_calls, send_json, tool_calls_to_batch};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use browser_agent::{
    ContentBlock, Conversation, Message, ModelClient, RawAction, Role, Screenshot, StepStatus,
};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-computer-use-preview-10-2025";

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body(&self, system_prompt: &str, conversation: &Conversation) -> Value {
        let contents = gemini_contents(conversation);
        let mut body = json!({
            "contents": contents,
            "tools": [{ "computerUse": { "environment": "ENVIRONMENT_BROWSER" } }],
        });
        if !system_prompt.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system_prompt }] });
        }
        body
    }
}

/// Executed batches replay as `functionCall` parts answered by
/// `functionResponse` parts in the next user turn.
fn gemini_contents(conversation: &Conversation) -> Vec<Value> {
    let mut contents = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    for message in conversation.messages() {
        if let Some(batch) = assistant_calls(message) {
            let mut parts = Vec::new();
            if let Some(reasoning) = batch.reasoning.filter(|text| !text.trim().is_empty()) {
                parts.push(json!({ "text": reasoning }));
            }
            pending.clear();
            for action in batch.actions {
                parts.push(json!({ "functionCall": { "name": &action.name, "args": action.args } }));
                pending.push(action.name);
            }
            contents.push(json!({ "role": "model", "parts": parts }));
        } else if !pending.is_empty() && message.role != Role::Assistant {
            contents.push(function_responses(message, std::mem::take(&mut pending)));
        } else {
            pending.clear();
            contents.extend(gemini_content(message));
        }
    }
    contents
}

/// Successful calls report the page URL, which the computer-use tool
/// requires; failures report an error. The screenshot is attached to the
/// last executed call.
fn function_responses(message: &Message, names: Vec<String>) -> Value {
    let mut names = names.into_iter();
    let mut parts: Vec<Value> = Vec::new();
    let mut trailing: Vec<Value> = Vec::new();
    for block in &message.content {
        match block {
            ContentBlock::ActionResult {
                status,
                detail,
                state_changed,
                url,
                ..
            } => {
                let Some(name) = names.next() else {
                    trailing.extend(block.render().map(|text| json!({ "text": text })));
                    continue;
                };
                let response = match status {
                    StepStatus::Failed => json!({ "error": detail }),
                    StepStatus::Success => {
                        let mut response = json!({
                            "url": url.as_deref().unwrap_or("about:blank"),
                            "detail": detail,
                        });
                        if let Some(changed) = state_changed {
                            response["state_changed"] = json!(changed);
                        }
                        response
                    }
                };
                parts.push(json!({ "functionResponse": { "name": name, "response": response } }));
            }
            ContentBlock::Image(shot) => match parts.last_mut() {
                Some(last) => {
                    last["functionResponse"]["parts"] = json!([inline_data(shot)]);
                }
                None => trailing.push(inline_data(shot)),
            },
            ContentBlock::Text(text) if !text.trim().is_empty() => {
                trailing.push(json!({ "text": text }));
            }
            ContentBlock::Text(_) => {}
        }
    }
    for name in names {
        parts.push(json!({
            "functionResponse": { "name": name, "response": { "error": "not executed" } }
        }));
    }
    parts.extend(trailing);
    json!({ "role": "user", "parts": parts })
}

fn gemini_content(message: &Message) -> Option<Value> {
    let role = match message.role {
        Role::Assistant => "model",
        Role::User | Role::Observation => "user",
    };
    let parts: Vec<Value> = message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Image(shot) => Some(inline_data(shot)),
            other => other
                .render()
                .filter(|text| !text.trim().is_empty())
                .map(|text| json!({ "text": text })),
        })
        .collect();
    (!parts.is_empty()).then(|| json!({ "role": role, "parts": parts }))
}

fn inline_data(shot: &Screenshot) -> Value {
    json!({ "inlineData": { "mimeType": shot.mime(), "data": shot.to_base64() } })
}

fn response_to_batch(response: &Value) -> Result<String> {
    let candidate = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .ok_or_else(|| anyhow!("No candidates in Gemini response"))?;

    let mut actions = Vec::new();
    let mut prose = Vec::new();
    for part in candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        if let Some(call) = part.get("functionCall") {
            if let Some(name) = call.get("name").and_then(Value::as_str) {
                let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
                actions.push(RawAction::new(name, args));
            }
        } else if let Some(text) = part.get("text").and_then(Value::as_str) {
            prose.push(text.to_string());
        }
    }
    tool_calls_to_batch(actions, prose)
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn complete(&self, system_prompt: &str, conversation: &Conversation) -> Result<String> {
        info!(
            "[gemini] Requesting completion from {} ({} messages)",
            self.model,
            conversation.len()
        );
        let request = self
            .http
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(system_prompt, conversation));
        let response = send_json(request, "gemini").await?;
        response_to_batch(&response)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
