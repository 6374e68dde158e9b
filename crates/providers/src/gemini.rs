use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::agent_api::ChatMessage;
use shared::settings::ProviderAuth;
use std::env;

use crate::http::{status_error, SHARED_HTTP};

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

pub struct GeminiClient {
    http: Client,
    auth_token: String,
    model: String,
}

fn to_request(messages: Vec<ChatMessage>) -> GeminiRequest {
    let mut system_instruction = None;
    let mut contents = Vec::new();
    for m in messages {
        if m.role == "system" {
            system_instruction = Some(GeminiContent {
                role: "system".to_string(),
                parts: vec![GeminiPart { text: m.content }],
            });
        } else {
            // Gemini calls the assistant "model"
            let role = match m.role.as_str() {
                "assistant" => "model".to_string(),
                _ => m.role,
            };
            contents.push(GeminiContent {
                role,
                parts: vec![GeminiPart { text: m.content }],
            });
        }
    }
    GeminiRequest {
        contents,
        system_instruction,
    }
}

impl GeminiClient {
    pub fn from_auth(model: &str, auth: &ProviderAuth) -> Result<Self> {
        let auth_token = match &auth.api_key {
            Some(key) => key.clone(),
            None => env::var("GEMINI_API_KEY")
                .map_err(|_| anyhow!("No Gemini authentication configured"))?,
        };
        Ok(Self {
            http: SHARED_HTTP.clone(),
            auth_token,
            model: model.to_string(),
        })
    }

    pub async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );
        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.auth_token)
            .json(&to_request(messages))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(status_error("gemini", resp).await);
        }
        let body: GeminiResponse = resp.json().await?;
        Ok(body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_are_mapped() {
        let req = to_request(vec![
            ChatMessage::system("rules"),
            ChatMessage::user("q"),
            ChatMessage::assistant("a"),
        ]);
        assert_eq!(req.system_instruction.unwrap().parts[0].text, "rules");
        let roles: Vec<&str> = req.contents.iter().map(|c| c.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "model"]);
    }

    #[test]
    fn test_empty_candidates() {
        let body: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert!(body.candidates.is_empty());
    }
}
