//! HTTP adapters for `browser-agent`: Kernel remote browsers and browser
//! pools, the Moondream vision API, and model vendors.

pub mod config;
pub mod kernel;
pub mod moondream;
pub mod pool;
pub mod providers;

pub use config::KernelConfig;
pub use kernel::{KernelBrowser, KernelClient};
pub use moondream::MoondreamClient;
pub use pool::KernelPool;
pub use providers::{AnthropicClient, GeminiClient, OpenAiCompatClient};

/// Leading slice of a response body for logs, cut on a char boundary.
pub(crate) fn preview(text: &str) -> &str {
    const LIMIT: usize = 500;
    match text.char_indices().nth(LIMIT) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(600);
        assert_eq!(preview(&long).chars().count(), 500);
    }
}
