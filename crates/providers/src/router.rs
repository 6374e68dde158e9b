use crate::anthropic::AnthropicClient;
use crate::gemini::GeminiClient;
use crate::ollama::OllamaClient;
use crate::openai::OpenAIClient;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::agent_api::{ChatBackend, ChatMessage};
use shared::settings::ModelProvider;
use tracing::{debug, warn};

pub struct ProviderRouter {
    config: ModelProvider,
}

impl ProviderRouter {
    pub fn new(config: ModelProvider) -> Self {
        Self { config }
    }

    pub fn active_provider(&self) -> Option<&str> {
        self.config.provider_preference.first().map(|s| s.as_str())
    }

    async fn generate_with(&self, provider: &str, messages: Vec<ChatMessage>) -> Result<String> {
        match provider {
            "local" => {
                OllamaClient::new(self.config.local_model.clone())
                    .generate(messages)
                    .await
            }
            "openai" => {
                OpenAIClient::from_auth(
                    &self.config.openai_model,
                    &self.config.openai_auth,
                    self.config.openai_base_url.as_deref(),
                )?
                .generate(messages)
                .await
            }
            "anthropic" => {
                AnthropicClient::from_auth(&self.config.anthropic_model, &self.config.anthropic_auth)?
                    .generate(messages)
                    .await
            }
            "gemini" => {
                GeminiClient::from_auth(&self.config.gemini_model, &self.config.gemini_auth)?
                    .generate(messages)
                    .await
            }
            other => Err(anyhow!("Unknown provider: {}", other)),
        }
    }

    /// Tries providers in order of preference, falling back on failure.
    pub async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let mut last_error = None;

        for provider in &self.config.provider_preference {
            debug!(provider = provider.as_str(), "requesting completion");
            match self.generate_with(provider, messages.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(provider = provider.as_str(), error = %e, "provider failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("No providers configured")))
    }
}

#[async_trait]
impl ChatBackend for ProviderRouter {
    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String> {
        ProviderRouter::generate(self, messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_preference_errors() {
        let config = ModelProvider {
            provider_preference: vec![],
            ..ModelProvider::default()
        };
        let router = ProviderRouter::new(config);
        assert!(router.active_provider().is_none());
        let err = router.generate(vec![ChatMessage::user("hi")]).await.unwrap_err();
        assert!(err.to_string().contains("No providers configured"));
    }

    #[tokio::test]
    async fn test_unknown_provider_reports_last_error() {
        let config = ModelProvider {
            provider_preference: vec!["carrier-pigeon".into()],
            ..ModelProvider::default()
        };
        let router = ProviderRouter::new(config);
        assert_eq!(router.active_provider(), Some("carrier-pigeon"));
        let err = router.generate(vec![ChatMessage::user("hi")]).await.unwrap_err();
        assert!(err.to_string().contains("Unknown provider: carrier-pigeon"));
    }
}
