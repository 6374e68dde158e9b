pub mod tree;

pub mod settings {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, Default)]
    pub struct ProviderAuth {
        pub api_key: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ModelProvider {
        pub local_model: String,              // e.g., "llama3.2:3b" for Ollama
        pub provider_preference: Vec<String>, // e.g., ["anthropic", "openai", "gemini", "local"]
        pub openai_model: String,
        pub anthropic_model: String,
        pub gemini_model: String,
        /// OpenAI-compatible endpoint override (LM Studio, vLLM, ...)
        #[serde(default)]
        pub openai_base_url: Option<String>,

        #[serde(default)]
        pub openai_auth: ProviderAuth,
        #[serde(default)]
        pub anthropic_auth: ProviderAuth,
        #[serde(default)]
        pub gemini_auth: ProviderAuth,
    }

    impl Default for ModelProvider {
        fn default() -> Self {
            Self {
                local_model: "llama3.2:3b".into(),
                // Cloud providers first, fall back to local
                provider_preference: vec![
                    "anthropic".into(),
                    "openai".into(),
                    "gemini".into(),
                    "local".into(),
                ],
                openai_model: "gpt-4o-mini".into(),
                anthropic_model: "claude-3-5-sonnet-20241022".into(),
                gemini_model: "gemini-1.5-flash".into(),
                openai_base_url: None,
                openai_auth: ProviderAuth::default(),
                anthropic_auth: ProviderAuth::default(),
                gemini_auth: ProviderAuth::default(),
            }
        }
    }

    /// Where the key-value storage file lives
    #[derive(Debug, Clone, Serialize, Deserialize, Default)]
    pub struct StorageSettings {
        /// Overrides the platform data directory when set
        pub data_file: Option<String>,
    }

    /// Repository import settings
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ImportSettings {
        pub api_base: String,
        pub default_branch: String,
        /// Upper bound on blob downloads in flight
        pub max_concurrent_fetches: usize,
        /// Personal access token, raises the anonymous rate limit
        #[serde(default)]
        pub token: Option<String>,
    }

    impl Default for ImportSettings {
        fn default() -> Self {
            Self {
                api_base: "https://api.github.com".into(),
                default_branch: "main".into(),
                max_concurrent_fetches: 8,
                token: None,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Default)]
    pub struct AppSettings {
        #[serde(default)]
        pub model: ModelProvider,
        #[serde(default)]
        pub storage: StorageSettings,
        #[serde(default)]
        pub import: ImportSettings,
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_partial_settings_fill_defaults() {
            let settings: AppSettings =
                serde_json::from_str(r#"{"import": {"api_base": "http://localhost:9000", "default_branch": "dev", "max_concurrent_fetches": 2}}"#)
                    .unwrap();
            assert_eq!(settings.import.default_branch, "dev");
            assert!(settings.import.token.is_none());
            assert_eq!(settings.model.provider_preference.len(), 4);
            assert!(settings.storage.data_file.is_none());
        }
    }
}

pub mod agent_api {
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: String, // "system" | "user" | "assistant"
        pub content: String,
    }

    impl ChatMessage {
        pub fn system(content: impl Into<String>) -> Self {
            Self {
                role: "system".into(),
                content: content.into(),
            }
        }

        pub fn user(content: impl Into<String>) -> Self {
            Self {
                role: "user".into(),
                content: content.into(),
            }
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            Self {
                role: "assistant".into(),
                content: content.into(),
            }
        }
    }

    /// Anything that can turn a conversation into a single completion.
    #[async_trait]
    pub trait ChatBackend: Send + Sync {
        async fn generate(&self, messages: Vec<ChatMessage>) -> anyhow::Result<String>;
    }

    #[async_trait]
    impl<T: ChatBackend + ?Sized> ChatBackend for std::sync::Arc<T> {
        async fn generate(&self, messages: Vec<ChatMessage>) -> anyhow::Result<String> {
            (**self).generate(messages).await
        }
    }
}
