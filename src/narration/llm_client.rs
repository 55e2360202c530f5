// SYNOID Chat Completion Client
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Speaks the OpenAI-compatible chat-completions wire format. Works against
// a local gpt-oss server, OpenAI, or an Azure OpenAI deployment URL.

use crate::narration::error::{NarrationError, Result};
use crate::narration::prompt::ChatMessage;
use crate::narration::rewrite::RewriteService;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    #[default]
    Bearer,
    /// `api-key: <key>` as Azure OpenAI expects.
    AzureApiKey,
}

impl AuthStyle {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bearer" | "openai" => Some(AuthStyle::Bearer),
            "azure" | "azure_api_key" | "api-key" | "api_key" => Some(AuthStyle::AzureApiKey),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL (`.../v1`) or a full `.../chat/completions` deployment URL.
    pub api_url: String,
    pub api_key: Option<String>,
    /// Omitted from the payload when unset (Azure deployments imply it).
    pub model: Option<String>,
    pub auth_style: AuthStyle,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: Some("gpt-oss:20b".to_string()),
            auth_style: AuthStyle::Bearer,
            timeout_secs: 60,
            max_tokens: 4096,
        }
    }
}

impl EndpointConfig {
    pub fn endpoint(&self) -> String {
        let base = self.api_url.trim_end_matches('/');
        if base.contains("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }
}

pub struct ChatCompletionClient {
    client: reqwest::Client,
    config: EndpointConfig,
}

impl ChatCompletionClient {
    pub fn new(config: EndpointConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| NarrationError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    fn payload(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let mut payload = json!({
            "messages": messages,
            "temperature": 0,
            "max_tokens": self.config.max_tokens,
        });
        if let Some(model) = &self.config.model {
            payload["model"] = json!(model);
        }
        payload
    }
}

#[async_trait]
impl RewriteService for ChatCompletionClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let endpoint = self.config.endpoint();
        debug!("[TRANSPORT] POST {} ({} messages)", endpoint, messages.len());

        let mut request = self.client.post(&endpoint).json(&self.payload(messages));
        if let Some(key) = &self.config.api_key {
            request = match self.config.auth_style {
                AuthStyle::Bearer => request.bearer_auth(key),
                AuthStyle::AzureApiKey => request.header("api-key", key),
            };
        }

        let resp = request.send().await.map_err(|e| {
            error!("[TRANSPORT] Connection failed: {}", e);
            NarrationError::TransientTransport(e.to_string())
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| NarrationError::TransientTransport(format!("reading body: {}", e)))?;
        extract_content(&json)
    }
}

/// Map a non-success HTTP status onto the retry taxonomy.
pub fn classify_status(status: StatusCode, body: String) -> NarrationError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        NarrationError::RateLimited(body)
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        NarrationError::TransientTransport(format!("{}: {}", status, body))
    } else {
        NarrationError::RequestRejected {
            status: status.as_u16(),
            body,
        }
    }
}

/// `choices[0].message.content`
pub fn extract_content(json: &serde_json::Value) -> Result<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| NarrationError::MalformedResponse("missing choices[0].message.content".to_string()))
}
