//! OpenAI-compatible chat completions (OpenAI, Groq, Yutori n1).
//!
//! These models answer in text, which is passed through to the parser as is.

use super::send_json;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use browser_agent::{Conversation, Message, ModelClient, Role};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const YUTORI_BASE_URL: &str = "https://api.yutori.com/v1";

pub struct OpenAiCompatClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
    /// Text-only models get observations without screenshots
    send_images: bool,
    label: &'static str,
}

impl OpenAiCompatClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            max_tokens: 4096,
            temperature: None,
            send_images: true,
            label: "openai",
        })
    }

    /// Groq-hosted text model; screenshots are left to the vision service.
    pub fn groq(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let mut client = Self::new(api_key, model)?.with_base_url(GROQ_BASE_URL);
        client.send_images = false;
        client.label = "groq";
        Ok(client)
    }

    pub fn yutori(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let mut client = Self::new(api_key, model)?
            .with_base_url(YUTORI_BASE_URL)
            .with_temperature(0.3);
        client.label = "yutori";
        Ok(client)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_images(mut self, send_images: bool) -> Self {
        self.send_images = send_images;
        self
    }

    fn request_body(&self, system_prompt: &str, conversation: &Conversation) -> Value {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if !system_prompt.is_empty() {
            messages.push(json!({ "role": "system", "content": system_prompt }));
        }
        messages.extend(
            conversation
                .messages()
                .iter()
                .map(|m| chat_message(m, self.send_images)),
        );

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

fn chat_message(message: &Message, send_images: bool) -> Value {
    match message.role {
        Role::Assistant => json!({ "role": "assistant", "content": message.text() }),
        Role::User | Role::Observation => {
            let mut parts = Vec::new();
            let text = message.text();
            if !text.is_empty() {
                parts.push(json!({ "type": "text", "text": text }));
            }
            if send_images {
                parts.extend(message.images().map(|shot| {
                    json!({ "type": "image_url", "image_url": { "url": shot.data_url() } })
                }));
            }
            if parts.is_empty() {
                parts.push(json!({ "type": "text", "text": "(no content)" }));
            }
            json!({ "role": "user", "content": parts })
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    async fn complete(&self, system_prompt: &str, conversation: &Conversation) -> Result<String> {
        info!(
            "[{}] Requesting completion from {} ({} messages)",
            self.label,
            self.model,
            conversation.len()
        );
        let request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(system_prompt, conversation));
        let response = send_json(request, self.label).await?;
        message_content(&response)
    }

    fn name(&self) -> &str {
        self.label
    }
}

fn message_content(response: &Value) -> Result<String> {
    let message = response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("No choices in API response"))?;
    Ok(message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use browser_agent::screenshot::solid_png;
    use browser_agent::{ContentBlock, Screenshot};
    use pretty_assertions::assert_eq;

    fn conversation() -> Conversation {
        let mut conversation = Conversation::new();
        conversation.append(Message::user("Find the weather"));
        conversation.append(Message::assistant(r#"{"actions":[]}"#));
        conversation.append(Message::observation(vec![
            ContentBlock::Text("ok".into()),
            ContentBlock::Image(Screenshot::from_bytes(solid_png(4, 4, [0, 0, 0]).unwrap())),
        ]));
        conversation
    }

    #[test]
    fn test_request_body_shape() {
        let client = OpenAiCompatClient::yutori("key", "n1-latest").unwrap();
        let body = client.request_body("system", &conversation());

        assert_eq!(body["model"], "n1-latest");
        assert_eq!(body["temperature"], json!(0.3f32));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], json!({ "role": "system", "content": "system" }));
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[2]["content"], r#"{"actions":[]}"#);

        let parts = messages[3]["content"].as_array().unwrap();
        assert_eq!(parts[0], json!({ "type": "text", "text": "ok" }));
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_groq_drops_images() {
        let client = OpenAiCompatClient::groq("key", "llama").unwrap();
        let body = client.request_body("", &conversation());
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(
            messages[2]["content"],
            json!([{ "type": "text", "text": "ok" }])
        );
        assert_eq!(client.name(), "groq");
    }

    #[test]
    fn test_message_content() {
        let response = json!({ "choices": [{ "message": { "content": "{\"actions\":[]}" } }] });
        assert_eq!(message_content(&response).unwrap(), r#"{"actions":[]}"#);
        assert!(message_content(&json!({ "choices": [] })).is_err());
    }
}
