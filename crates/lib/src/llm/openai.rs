//! OpenAI-compatible chat completions client (Azure OpenAI deployments or any server that
//! speaks `/chat/completions`). Non-streaming only.

use super::TextRewriter;
use crate::config::{RewriteAuth, RewriteConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const SYSTEM_PROMPT: &str = "Eres un asistente que edita el contenido de una sesión de equipo. \
Aplica únicamente los cambios que pide el usuario, conserva el resto del texto y responde \
solo con el contenido final, sin comentarios adicionales.";

#[derive(Clone)]
pub struct OpenAiClient {
    endpoint: Option<String>,
    api_key: Option<String>,
    auth: RewriteAuth,
    model: Option<String>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("rewrite endpoint not configured")]
    NotConfigured,
    #[error("rewrite request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("rewrite api error: {0}")]
    Api(String),
    #[error("rewrite returned no content")]
    EmptyCompletion,
}

/// One chat message (system, user or assistant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

impl OpenAiClient {
    pub fn new(config: &RewriteConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            auth: config.auth,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            client: reqwest::Client::new(),
        }
    }

    /// True when an endpoint is configured; the dialogue hides assistant editing otherwise.
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    /// POST the messages and return the first choice's content.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, RewriteError> {
        let url = self.endpoint.as_deref().ok_or(RewriteError::NotConfigured)?;
        let body = ChatRequest {
            model: self.model.as_deref(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            stream: false,
        };
        let mut req = self.client.post(url).json(&body);
        if let Some(key) = &self.api_key {
            req = match self.auth {
                RewriteAuth::ApiKey => req.header("api-key", key),
                RewriteAuth::Bearer => req.bearer_auth(key),
            };
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(RewriteError::Api(format!("{} {}", status, body)));
        }
        let data: ChatResponse = res.json().await?;
        first_content(data)
    }
}

fn first_content(data: ChatResponse) -> Result<String, RewriteError> {
    data.choices
        .into_iter()
        .find_map(|c| c.message)
        .map(|m| m.content.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or(RewriteError::EmptyCompletion)
}

/// User message carrying the current content and the requested changes.
fn rewrite_prompt(content: &str, instructions: &str) -> String {
    format!(
        "Contenido actual:\n\n{}\n\nCambios solicitados:\n\n{}",
        content.trim(),
        instructions.trim()
    )
}

#[async_trait]
impl TextRewriter for OpenAiClient {
    async fn rewrite(&self, content: &str, instructions: &str) -> Result<String, RewriteError> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(rewrite_prompt(content, instructions)),
        ];
        self.chat(&messages).await
    }
}
