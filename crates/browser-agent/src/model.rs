//! Model seam. Adapters turn vendor responses into text the response parser
//! understands: either a JSON action batch or plain prose.

use crate::conversation::Conversation;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// One assistant turn for the whole conversation so far.
    async fn complete(&self, system_prompt: &str, conversation: &Conversation) -> Result<String>;

    /// Short identifier used in logs and execution ids.
    fn name(&self) -> &str {
        "model"
    }
}
