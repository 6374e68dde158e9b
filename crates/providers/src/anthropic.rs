use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::agent_api::ChatMessage;
use shared::settings::ProviderAuth;
use std::env;

use crate::http::{status_error, SHARED_HTTP};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize, PartialEq)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

pub struct AnthropicClient {
    http: Client,
    auth_token: String,
    model: String,
}

/// System turns are lifted into the top-level `system` field; the rest keep order.
fn split_system(messages: Vec<ChatMessage>) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system_prompt = String::new();
    let mut rest = Vec::new();
    for m in messages {
        if m.role == "system" {
            if !system_prompt.is_empty() {
                system_prompt.push_str("\n\n");
            }
            system_prompt.push_str(&m.content);
        } else {
            rest.push(AnthropicMessage {
                role: m.role,
                content: m.content,
            });
        }
    }
    let system = if system_prompt.trim().is_empty() {
        None
    } else {
        Some(system_prompt)
    };
    (system, rest)
}

impl AnthropicClient {
    pub fn from_auth(model: &str, auth: &ProviderAuth) -> Result<Self> {
        let auth_token = match &auth.api_key {
            Some(key) => key.clone(),
            None => env::var("ANTHROPIC_API_KEY")
                .map_err(|_| anyhow!("No Anthropic authentication configured"))?,
        };
        Ok(Self {
            http: SHARED_HTTP.clone(),
            auth_token,
            model: model.to_string(),
        })
    }

    pub async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let (system, messages) = split_system(messages);
        let req = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: 8192,
            system,
            messages,
        };

        let resp = self
            .http
            .post(MESSAGES_URL)
            .header("x-api-key", &self.auth_token)
            .header("anthropic-version", "2023-06-01")
            .json(&req)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(status_error("anthropic", resp).await);
        }

        let body: AnthropicResponse = resp.json().await?;
        Ok(body
            .content
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_system_merges_system_turns() {
        let (system, rest) = split_system(vec![
            ChatMessage::system("one"),
            ChatMessage::user("hi"),
            ChatMessage::system("two"),
            ChatMessage::assistant("hello"),
        ]);
        assert_eq!(system.as_deref(), Some("one\n\ntwo"));
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].role, "user");
        assert_eq!(rest[1].role, "assistant");
    }

    #[test]
    fn test_split_system_without_system_turns() {
        let (system, rest) = split_system(vec![ChatMessage::user("hi")]);
        assert!(system.is_none());
        assert_eq!(rest, vec![AnthropicMessage { role: "user".into(), content: "hi".into() }]);
    }

    #[test]
    fn test_response_text_blocks() {
        let body: AnthropicResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"[{\"name\":"},{"type":"text","text":"\"x\"}]"}]}"#,
        )
        .unwrap();
        let text: String = body.content.into_iter().map(|c| c.text).collect();
        assert_eq!(text, r#"[{"name":"x"}]"#);
    }
}
