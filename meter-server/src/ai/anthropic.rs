//! Anthropic Messages API collaborator, implemented over raw `reqwest`
//! rather than a dedicated SDK crate (none appear in the reference corpus).

use async_trait::async_trait;
use meter_core::AiAuditor;
use serde_json::json;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MODEL: &str = "claude-sonnet-4-20250514";

pub struct AnthropicAuditor {
    client: reqwest::Client,
    api_key: String,
}

impl AnthropicAuditor {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), api_key: api_key.into() }
    }
}

#[async_trait]
impl AiAuditor for AnthropicAuditor {
    async fn respond(&self, system_context: &str, user_message: &str) -> anyhow::Result<String> {
        let body = json!({
            "model": MODEL,
            "max_tokens": 300,
            "system": system_context,
            "messages": [{ "role": "user", "content": user_message }],
        });

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: serde_json::Value = response.json().await?;
        let text = parsed["content"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Anthropic response missing content[0].text"))?;
        Ok(text.trim().to_string())
    }

    fn model_name(&self) -> &str {
        MODEL
    }
}
