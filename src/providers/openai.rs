//! OpenAI-compatible capability handler.
//!
//! Talks to any endpoint exposing `/chat/completions` and
//! `/images/generations` (OpenAI, OpenRouter, Perplexity, LiteLLM proxies),
//! so one implementation can back several [`HandlerKind`]s.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::capability::{Capability, HandlerKind};
use super::invoker::{CapabilityHandler, HandlerResponse, InvokePayload};
use crate::config::HandlerSettings;
use crate::error::ProviderError;

/// Request timeout for a single call. Long-form articles take a while.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Default image size requested from image endpoints.
const DEFAULT_IMAGE_SIZE: &str = "1792x1024";

/// Handler for OpenAI-compatible APIs.
pub struct OpenAiCompatibleHandler {
    kind: HandlerKind,
    api_base: String,
    api_key: Option<String>,
    model: String,
    image_model: Option<String>,
    http_client: Client,
}

impl OpenAiCompatibleHandler {
    /// Create a handler from explicit settings.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::RequestFailed` if the HTTP client cannot be built.
    pub fn new(kind: HandlerKind, settings: &HandlerSettings) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        Ok(Self {
            kind,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            image_model: settings.image_model.clone(),
            http_client,
        })
    }

    /// The configured text model.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn chat(&self, payload: &InvokePayload) -> Result<HandlerResponse, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = payload.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }

        let user = match payload.context {
            Some(ref context) => format!("{}\n\n{}", payload.prompt, context),
            None => payload.prompt.clone(),
        };
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: user,
        });

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: payload.temperature,
            max_tokens: payload.max_tokens,
        };

        let url = format!("{}/chat/completions", self.api_base);
        let response = self
            .authorized(self.http_client.post(&url))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let response = check_status(response).await?;
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;

        if choice.finish_reason.as_deref() == Some("length") {
            tracing::warn!(
                handler = %self.kind,
                model = %self.model,
                "Completion hit the token ceiling; output may be incomplete"
            );
        }

        Ok(HandlerResponse::new(choice.message.content.unwrap_or_default()))
    }

    async fn image(&self, payload: &InvokePayload) -> Result<HandlerResponse, ProviderError> {
        let request = ImageRequest {
            model: self
                .image_model
                .clone()
                .unwrap_or_else(|| self.model.clone()),
            prompt: payload.prompt.clone(),
            n: 1,
            size: DEFAULT_IMAGE_SIZE.to_string(),
        };

        let url = format!("{}/images/generations", self.api_base);
        let response = self
            .authorized(self.http_client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let response = check_status(response).await?;
        let body: ImageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let image = body
            .data
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;

        match (image.url, image.b64_json) {
            (Some(url), _) => Ok(HandlerResponse::new(url)),
            (None, Some(b64)) => Ok(HandlerResponse::new(format!(
                "data:image/png;base64,{}",
                b64
            ))),
            (None, None) => Err(ProviderError::EmptyResponse),
        }
    }
}

#[async_trait]
impl CapabilityHandler for OpenAiCompatibleHandler {
    fn kind(&self) -> HandlerKind {
        self.kind
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::GenerateImage => {
                self.image_model.is_some() && self.kind.supports(capability)
            }
            _ => self.kind.supports(capability),
        }
    }

    async fn invoke(
        &self,
        capability: Capability,
        payload: &InvokePayload,
    ) -> Result<HandlerResponse, ProviderError> {
        if !self.supports(capability) {
            return Err(ProviderError::Unsupported(capability.to_string()));
        }

        match capability {
            Capability::Research | Capability::GenerateText => self.chat(payload).await,
            Capability::GenerateImage => self.image(payload).await,
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = status.as_u16();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());

    let message = serde_json::from_str::<ApiErrorResponse>(&text)
        .map(|e| e.error.message)
        .unwrap_or(text);

    if code == 429 {
        return Err(ProviderError::RateLimited(message));
    }

    Err(ProviderError::ApiError { code, message })
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    model: String,
    prompt: String,
    n: u32,
    size: String,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(image_model: Option<&str>) -> HandlerSettings {
        HandlerSettings {
            api_base: "https://api.example.com/v1/".to_string(),
            api_key: Some("key".to_string()),
            model: "text-model".to_string(),
            image_model: image_model.map(str::to_string),
        }
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let handler =
            OpenAiCompatibleHandler::new(HandlerKind::OpenAi, &settings(None)).expect("build");
        assert_eq!(handler.api_base, "https://api.example.com/v1");
        assert_eq!(handler.model(), "text-model");
    }

    #[test]
    fn test_image_support_requires_image_model() {
        let without =
            OpenAiCompatibleHandler::new(HandlerKind::OpenAi, &settings(None)).expect("build");
        assert!(!without.supports(Capability::GenerateImage));
        assert!(without.supports(Capability::GenerateText));

        let with = OpenAiCompatibleHandler::new(HandlerKind::OpenAi, &settings(Some("dall-e-3")))
            .expect("build");
        assert!(with.supports(Capability::GenerateImage));
    }

    #[test]
    fn test_kind_limits_capabilities() {
        let perplexity =
            OpenAiCompatibleHandler::new(HandlerKind::Perplexity, &settings(Some("img")))
                .expect("build");
        assert!(perplexity.supports(Capability::Research));
        assert!(!perplexity.supports(Capability::GenerateImage));
        assert!(!perplexity.supports(Capability::GenerateText));
    }

    #[tokio::test]
    async fn test_unsupported_capability_rejected() {
        let handler =
            OpenAiCompatibleHandler::new(HandlerKind::Perplexity, &settings(None)).expect("build");
        let err = handler
            .invoke(Capability::GenerateImage, &InvokePayload::new("a cat"))
            .await
            .expect_err("unsupported");
        assert!(matches!(err, ProviderError::Unsupported(_)));
    }

    #[test]
    fn test_chat_request_skips_empty_options() {
        let request = ChatRequest {
            model: "m".to_string(),
            messages: vec![],
            temperature: None,
            max_tokens: Some(10),
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert!(json.get("temperature").is_none());
        assert_eq!(json["max_tokens"], 10);
    }
}
