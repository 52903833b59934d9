//! Minimal OpenAI-compatible chat completions client.
//!
//! This crate provides a focused client for the `/chat/completions` endpoint
//! spoken by OpenAI and most hosted or self-hosted model gateways:
//! - Non-streaming completions
//! - JSON-object response mode
//! - Configurable base URL and model

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Errors that can occur when using the chat client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("API returned no content")]
    EmptyContent,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Chat completions client.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl Client {
    /// Create a new client with the given API key against the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .connect_timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a client from `LLM_API_KEY`, `LLM_BASE_URL` and `LLM_MODEL`.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("LLM_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(Error::NoApiKey)?;

        let mut client = Self::new(api_key);
        if let Ok(base_url) = std::env::var("LLM_BASE_URL") {
            if !base_url.trim().is_empty() {
                client = client.with_base_url(base_url);
            }
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            if !model.trim().is_empty() {
                client = client.with_model(model);
            }
        }
        Ok(client)
    }

    /// Set the API base URL (everything before `/chat/completions`).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a completion request and return the full response.
    pub async fn complete(&self, request: Request) -> Result<Response, Error> {
        let api_request = self.build_api_request(&request);
        let headers = self.build_headers()?;

        tracing::debug!(
            model = %api_request.model,
            json = api_request.response_format.is_some(),
            "sending chat completion request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .headers(headers)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        Ok(parse_response(api_response))
    }

    /// Send a completion request and return only the trimmed reply text.
    ///
    /// A missing or blank reply is reported as [`Error::EmptyContent`].
    pub async fn complete_text(&self, request: Request) -> Result<String, Error> {
        let response = self.complete(request).await?;
        match response.text() {
            Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Err(Error::EmptyContent),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
        );
        Ok(headers)
    }

    fn build_api_request(&self, request: &Request) -> ApiRequest {
        let messages = request
            .messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();

        ApiRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request.response_format.map(|format| ApiResponseFormat {
                r#type: format.as_str().to_string(),
            }),
        }
    }
}

fn parse_response(api_response: ApiResponse) -> Response {
    let first = api_response.choices.into_iter().next();
    let (content, finish_reason) = match first {
        Some(choice) => (
            choice.message.content,
            FinishReason::from_api(choice.finish_reason.as_deref()),
        ),
        None => (None, FinishReason::Other),
    };

    Response {
        id: api_response.id,
        model: api_response.model,
        content,
        finish_reason,
        usage: api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }),
    }
}

// ============================================================================
// Public types
// ============================================================================

/// A completion request.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: Option<String>,
    pub max_tokens: Option<usize>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub response_format: Option<ResponseFormat>,
}

impl Request {
    /// Create a new request with the given messages.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            max_tokens: None,
            messages,
            temperature: None,
            response_format: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Ask the model to reply with a single JSON object.
    pub fn with_json_response(mut self) -> Self {
        self.response_format = Some(ResponseFormat::JsonObject);
        self
    }
}

/// A message in the conversation.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Requested reply format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

impl ResponseFormat {
    fn as_str(self) -> &'static str {
        match self {
            ResponseFormat::Text => "text",
            ResponseFormat::JsonObject => "json_object",
        }
    }
}

/// A completion response.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: String,
    pub model: String,
    /// Content of the first choice. Providers may send `null`.
    pub content: Option<String>,
    pub finish_reason: FinishReason,
    pub usage: Option<Usage>,
}

impl Response {
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Other,
}

impl FinishReason {
    fn from_api(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ApiResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ApiResponseFormat {
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = Client::new("test-key");
        assert_eq!(client.model, DEFAULT_MODEL);
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_client_builders() {
        let client = Client::new("test-key")
            .with_model("deepseek-chat")
            .with_base_url("https://api.deepseek.com/v1/");
        assert_eq!(client.model(), "deepseek-chat");
        assert_eq!(client.base_url(), "https://api.deepseek.com/v1");
        assert_eq!(
            client.endpoint(),
            "https://api.deepseek.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_builder() {
        let request = Request::new(vec![Message::user("Hello")])
            .with_max_tokens(500)
            .with_temperature(0.7)
            .with_json_response();

        assert_eq!(request.max_tokens, Some(500));
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.response_format, Some(ResponseFormat::JsonObject));
    }

    #[test]
    fn test_api_request_serialization() {
        let client = Client::new("test-key").with_model("gpt-4o-mini");
        let request = Request::new(vec![Message::system("be brief"), Message::user("Hi")])
            .with_max_tokens(100)
            .with_json_response();

        let value = serde_json::to_value(client.build_api_request(&request)).unwrap();
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "Hi");
        assert_eq!(value["max_tokens"], 100);
        assert_eq!(value["response_format"]["type"], "json_object");
        assert!(value.get("temperature").is_none());
    }

    #[test]
    fn test_request_model_overrides_client_model() {
        let client = Client::new("test-key");
        let request = Request::new(vec![Message::user("Hi")]).with_model("other");
        assert_eq!(client.build_api_request(&request).model, "other");
    }

    #[test]
    fn test_bearer_header() {
        let headers = Client::new("sk-test").build_headers().unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-test");
    }

    #[test]
    fn test_invalid_api_key_header() {
        let result = Client::new("bad\nkey").build_headers();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-3.5-turbo",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let api: ApiResponse = serde_json::from_str(body).unwrap();
        let response = parse_response(api);

        assert_eq!(response.text(), Some("hello"));
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.unwrap().completion_tokens, 3);
    }

    #[test]
    fn test_parse_response_null_content() {
        let body = r#"{"id": "x", "model": "m", "choices": [{"message": {"content": null}, "finish_reason": "length"}]}"#;
        let api: ApiResponse = serde_json::from_str(body).unwrap();
        let response = parse_response(api);

        assert_eq!(response.text(), None);
        assert_eq!(response.finish_reason, FinishReason::Length);
    }

    #[test]
    fn test_parse_response_no_choices() {
        let api: ApiResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let response = parse_response(api);
        assert!(response.content.is_none());
        assert_eq!(response.finish_reason, FinishReason::Other);
    }
}
