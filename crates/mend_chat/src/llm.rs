//! LLM adapter for completions.
//!
//! Supports OpenAI and Anthropic APIs, selected via environment variables
//! or workspace settings. Failures are never retried.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ChatError, ChatResult};
use crate::settings::Settings;

/// Per-call options for a completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionOptions {
    /// System prompt
    pub system: Option<String>,
    /// Image attached to the prompt, as a `data:` URL
    pub image: Option<String>,
    /// Model override for this call
    pub model: Option<String>,
}

impl CompletionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn image(mut self, data_url: impl Into<String>) -> Self {
        self.image = Some(data_url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Text generation service consumed as a black box.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> ChatResult<String>;
}

/// LLM provider type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
}

/// LLM adapter that handles API calls
#[derive(Debug, Clone)]
pub struct LlmAdapter {
    provider: LlmProvider,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl LlmAdapter {
    /// Create a new LLM adapter with explicit configuration
    pub fn new(provider: LlmProvider, api_key: String, model: Option<String>) -> Self {
        let default_model = match provider {
            LlmProvider::OpenAI => "gpt-4o-mini".to_string(),
            LlmProvider::Anthropic => "claude-sonnet-4-5".to_string(),
        };

        Self {
            provider,
            api_key,
            model: model.unwrap_or(default_model),
            client: reqwest::Client::new(),
        }
    }

    /// Create an LLM adapter from environment variables
    ///
    /// Checks in order:
    /// 1. OPENAI_API_KEY
    /// 2. ANTHROPIC_API_KEY
    pub fn from_env() -> ChatResult<Self> {
        let custom_model = std::env::var("MEND_LLM_MODEL").ok();

        if let Some(api_key) = non_empty_var("OPENAI_API_KEY") {
            return Ok(Self::new(LlmProvider::OpenAI, api_key, custom_model));
        }

        if let Some(api_key) = non_empty_var("ANTHROPIC_API_KEY") {
            return Ok(Self::new(LlmProvider::Anthropic, api_key, custom_model));
        }

        Err(ChatError::LlmNotConfigured)
    }

    /// Create an LLM adapter from workspace settings
    ///
    /// The provider named in settings wins; its key still comes from the
    /// environment. `MEND_LLM_MODEL` overrides the configured model.
    pub fn from_settings(settings: &Settings) -> ChatResult<Self> {
        let model = std::env::var("MEND_LLM_MODEL")
            .ok()
            .or_else(|| settings.default_model.clone());

        let (provider, var) = if settings.default_provider == "anthropic" {
            (LlmProvider::Anthropic, "ANTHROPIC_API_KEY")
        } else {
            (LlmProvider::OpenAI, "OPENAI_API_KEY")
        };

        match non_empty_var(var) {
            Some(api_key) => Ok(Self::new(provider, api_key, model)),
            None => Self::from_env(),
        }
    }

    /// Get the current provider
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// Get the current model
    pub fn model(&self) -> &str {
        &self.model
    }

    // OpenAI chat completion
    async fn complete_openai(&self, prompt: &str, options: &CompletionOptions) -> ChatResult<String> {
        let url = "https://api.openai.com/v1/chat/completions";

        let mut messages = Vec::new();
        if let Some(system) = &options.system {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: OpenAIContent::Text(system.clone()),
            });
        }

        let content = match &options.image {
            Some(image) => OpenAIContent::Parts(vec![
                OpenAIPart::Text {
                    text: prompt.to_string(),
                },
                OpenAIPart::ImageUrl {
                    image_url: OpenAIImageUrl { url: image.clone() },
                },
            ]),
            None => OpenAIContent::Text(prompt.to_string()),
        };
        messages.push(OpenAIMessage {
            role: "user".to_string(),
            content,
        });

        let request = OpenAIRequest {
            model: options.model.clone().unwrap_or_else(|| self.model.clone()),
            messages,
            max_completion_tokens: Some(4096),
        };

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::provider(None, format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::provider(Some(status.as_u16()), body));
        }

        let result: OpenAIResponse = response.json().await.map_err(|e| {
            ChatError::provider(Some(status.as_u16()), format!("Failed to parse response: {}", e))
        })?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ChatError::provider(Some(status.as_u16()), "No response from OpenAI"))
    }

    // Anthropic messages
    async fn complete_anthropic(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> ChatResult<String> {
        let url = "https://api.anthropic.com/v1/messages";

        let mut content = Vec::new();
        if let Some(image) = &options.image {
            content.push(AnthropicBlock::Image {
                source: anthropic_image_source(image),
            });
        }
        content.push(AnthropicBlock::Text {
            text: prompt.to_string(),
        });

        let request = AnthropicRequest {
            model: options.model.clone().unwrap_or_else(|| self.model.clone()),
            max_tokens: 4096,
            system: options.system.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content,
            }],
        };

        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::provider(None, format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::provider(Some(status.as_u16()), body));
        }

        let result: AnthropicResponse = response.json().await.map_err(|e| {
            ChatError::provider(Some(status.as_u16()), format!("Failed to parse response: {}", e))
        })?;

        let text: String = result
            .content
            .into_iter()
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(ChatError::provider(
                Some(status.as_u16()),
                "No response from Anthropic",
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl CompletionProvider for LlmAdapter {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> ChatResult<String> {
        info!(
            "Requesting completion from {:?} ({} chars, image: {})",
            self.provider,
            prompt.len(),
            options.image.is_some()
        );

        let text = match self.provider {
            LlmProvider::OpenAI => self.complete_openai(prompt, options).await?,
            LlmProvider::Anthropic => self.complete_anthropic(prompt, options).await?,
        };

        debug!("Completion returned {} chars", text.len());
        Ok(text)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Split a `data:<media>;base64,<data>` URL into an Anthropic image source.
fn anthropic_image_source(image: &str) -> AnthropicImageSource {
    let parsed = image.strip_prefix("data:").and_then(|rest| {
        let (meta, data) = rest.split_once(',')?;
        let media_type = meta.strip_suffix(";base64")?;
        Some((media_type.to_string(), data.to_string()))
    });

    match parsed {
        Some((media_type, data)) => AnthropicImageSource::Base64 { media_type, data },
        None => AnthropicImageSource::Url {
            url: image.to_string(),
        },
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: OpenAIContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAIPart {
    Text { text: String },
    ImageUrl { image_url: OpenAIImageUrl },
}

#[derive(Debug, Serialize)]
struct OpenAIImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text { text: String },
    Image { source: AnthropicImageSource },
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: Option<String>,
}
