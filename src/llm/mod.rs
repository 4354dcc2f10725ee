use async_trait::async_trait;
use log::{debug, error};
use serde_json::Value;
use std::time::Duration;

use crate::core::config::AiConfig;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        prompt: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

/// Client for any OpenAI-compatible chat completion endpoint.
pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let defaults = AiConfig::default();
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or(defaults.base_url),
            model: defaults.model,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        }
    }

    /// Returns `None` when no API key is configured.
    pub fn from_config(config: &AiConfig) -> Option<Self> {
        let api_key = config.api_key()?.to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build LLM HTTP client, using defaults: {e}");
                reqwest::Client::new()
            });
        Some(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAIClient {
    async fn generate(
        &self,
        system_prompt: &str,
        prompt: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": system_prompt},
                    {"role": "user", "content": prompt}
                ],
                "temperature": self.temperature,
                "max_tokens": self.max_tokens
            }))
            .send()
            .await?
            .error_for_status()?;

        let result: Value = response.json().await?;
        let content = result["choices"][0]["message"]["content"]
            .as_str()
            .map(str::trim)
            .unwrap_or("");

        if content.is_empty() {
            return Err("LLM response contained no message content".into());
        }
        debug!("LLM returned {} chars", content.len());
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client_for(url: String) -> OpenAIClient {
        OpenAIClient::new("test-key".to_string(), Some(url))
    }

    #[tokio::test]
    async fn test_generate_reads_first_choice() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "deepseek-chat",
                "max_tokens": 300
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"  Restart the router.  "}}]}"#)
            .create_async()
            .await;

        let answer = client_for(server.url())
            .generate("system", "my wifi drops")
            .await
            .unwrap();
        assert_eq!(answer, "Restart the router.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_http_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":"bad key"}"#)
            .create_async()
            .await;

        assert!(client_for(server.url()).generate("s", "q").await.is_err());
    }

    #[tokio::test]
    async fn test_generate_empty_content_is_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        assert!(client_for(server.url()).generate("s", "q").await.is_err());
    }

    #[test]
    fn test_from_config_requires_key() {
        assert!(OpenAIClient::from_config(&AiConfig::default()).is_none());
        let config = AiConfig {
            api_key: Some("sk".into()),
            base_url: "https://api.example.com/".into(),
            ..AiConfig::default()
        };
        let client = OpenAIClient::from_config(&config).unwrap();
        assert_eq!(client.base_url, "https://api.example.com");
    }
}
