use std::{env, fmt, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const OPENROUTER_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
const POE_ENDPOINT: &str = "https://api.poe.com/v1/chat/completions";

/// Enumerates the supported LLM backends.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LlmProvider {
    OpenRouter,
    Poe,
}

impl LlmProvider {
    fn endpoint(&self) -> &'static str {
        match self {
            LlmProvider::OpenRouter => OPENROUTER_ENDPOINT,
            LlmProvider::Poe => POE_ENDPOINT,
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::OpenRouter => write!(f, "openrouter"),
            LlmProvider::Poe => write!(f, "poe"),
        }
    }
}

/// Defines the shape of a chat-style interaction with an LLM.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
        }
    }

    fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub text: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MessageRole {
    System,
    User,
}

impl MessageRole {
    fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
        }
    }
}

/// Captures basic token usage metrics associated with a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub response_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub token_usage: TokenUsage,
    pub provider: LlmProvider,
    pub model: String,
}

/// Main entry point for invoking providers.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

#[derive(Clone, Default)]
struct LlmConfig {
    openrouter_api_key: Option<String>,
    poe_api_key: Option<String>,
    openrouter_referer: Option<String>,
    openrouter_title: Option<String>,
}

impl LlmClient {
    /// Build a client using environment variables.
    pub fn from_env() -> Result<Self> {
        let timeout = env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            config: LlmConfig {
                openrouter_api_key: env::var("OPENROUTER_API_KEY").ok(),
                poe_api_key: env::var("POE_API_KEY").ok(),
                openrouter_referer: env::var("OPENROUTER_HTTP_REFERER").ok(),
                openrouter_title: env::var("OPENROUTER_X_TITLE").ok(),
            },
        })
    }

    /// Execute a request against the provider encoded in the model name.
    pub async fn execute(&self, request: LlmRequest) -> Result<LlmResponse> {
        let (provider, model) = parse_model_provider(&request.model)?;

        let api_key = match provider {
            LlmProvider::OpenRouter => self.config.openrouter_api_key.as_ref(),
            LlmProvider::Poe => self.config.poe_api_key.as_ref(),
        };
        let Some(api_key) = api_key else {
            bail!("no API key configured for provider {provider}");
        };

        let messages: Vec<_> = request
            .messages
            .iter()
            .map(|msg| {
                serde_json::json!({
                    "role": msg.role.as_str(),
                    "content": msg.text,
                })
            })
            .collect();

        let payload = serde_json::json!({
            "model": model,
            "messages": messages,
        });

        let mut req_builder = self
            .http
            .post(provider.endpoint())
            .bearer_auth(api_key)
            .json(&payload);

        if provider == LlmProvider::OpenRouter {
            if let Some(referer) = &self.config.openrouter_referer {
                req_builder = req_builder.header("HTTP-Referer", referer);
            }
            if let Some(title) = &self.config.openrouter_title {
                req_builder = req_builder.header("X-Title", title);
            }
        }

        debug!(%provider, model, "sending chat completion request");

        let response = req_builder
            .send()
            .await
            .with_context(|| format!("{provider} request failed"))?;
        let status = response.status();
        let response_text = response.text().await.context("failed to read response body")?;
        let body: serde_json::Value = serde_json::from_str(&response_text).with_context(|| {
            format!(
                "failed to parse {provider} response as JSON. Response body: {}",
                preview(&response_text)
            )
        })?;
        if !status.is_success() {
            bail!("{provider} call failed with status {status}: {body}");
        }

        let (text, usage) = extract_text_and_usage(&body)
            .ok_or_else(|| anyhow!("unexpected {provider} response payload: {body}"))?;

        let token_usage = fill_usage(usage, &request.prompt_text(), &text);

        Ok(LlmResponse {
            text,
            token_usage,
            provider,
            model: model.to_string(),
        })
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(500) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn fill_usage(reported: Option<TokenUsage>, prompt: &str, reply: &str) -> TokenUsage {
    let mut usage = reported.unwrap_or_default();
    if usage.prompt_tokens == 0 {
        usage.prompt_tokens = approximate_token_count(prompt);
    }
    if usage.response_tokens == 0 {
        usage.response_tokens = approximate_token_count(reply);
    }
    usage.total_tokens = usage.prompt_tokens + usage.response_tokens;
    usage
}

/// Extract assistant text and optional usage metrics from either Responses or Chat Completions payloads.
fn extract_text_and_usage(value: &serde_json::Value) -> Option<(String, Option<TokenUsage>)> {
    if let Ok(resp) = serde_json::from_value::<ResponsesPayload>(value.clone()) {
        if !resp.output.is_empty() {
            let text = resp
                .output
                .into_iter()
                .filter(|item| item.item_type == "message")
                .flat_map(|item| item.content)
                .find_map(|content| match content.content_type.as_str() {
                    "output_text" | "text" => Some(content.text.unwrap_or_default()),
                    _ => None,
                })
                .unwrap_or_default();

            return Some((text, resp.usage.map(UsagePayload::into_usage)));
        }
    }

    if let Ok(chat) = serde_json::from_value::<ChatCompletionPayload>(value.clone()) {
        if chat.choices.is_empty() {
            return None;
        }
        let text = chat
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default();

        return Some((text, chat.usage.map(UsagePayload::into_usage)));
    }

    None
}

fn parse_model_provider(model: &str) -> Result<(LlmProvider, &str)> {
    let (provider, name) = model.split_once('/').ok_or_else(|| {
        anyhow!("model must be prefixed with provider, e.g. 'openrouter/openai/gpt-4o'")
    })?;

    if name.trim().is_empty() {
        bail!("model name is required after provider prefix");
    }

    match provider {
        "openrouter" => Ok((LlmProvider::OpenRouter, name)),
        "poe" => Ok((LlmProvider::Poe, name)),
        other => bail!("unsupported provider prefix: {other}"),
    }
}

fn approximate_token_count(input: &str) -> usize {
    input.split_whitespace().count()
}

#[derive(Debug, Deserialize)]
struct ResponsesPayload {
    #[serde(default)]
    output: Vec<ResponsesOutputItem>,
    #[serde(default)]
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputItem {
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    content: Vec<ResponsesOutputContent>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    #[serde(default)]
    prompt_tokens: Option<usize>,
    #[serde(default)]
    completion_tokens: Option<usize>,
    #[serde(default)]
    total_tokens: Option<usize>,
}

impl UsagePayload {
    fn into_usage(self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens.unwrap_or_default(),
            response_tokens: self.completion_tokens.unwrap_or_default(),
            total_tokens: self.total_tokens.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionPayload {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provider_prefix_is_required() {
        let (provider, name) = parse_model_provider("openrouter/openai/gpt-4o-mini").unwrap();
        assert_eq!(provider, LlmProvider::OpenRouter);
        assert_eq!(name, "openai/gpt-4o-mini");

        assert!(parse_model_provider("gpt-4o").is_err());
        assert!(parse_model_provider("poe/ ").is_err());
        assert!(parse_model_provider("azure/gpt").is_err());
    }

    #[test]
    fn chat_completion_payload_yields_text_and_usage() {
        let body = json!({
            "choices": [{"message": {"content": "{\"feedback\": \"ok\"}"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        });
        let (text, usage) = extract_text_and_usage(&body).unwrap();
        assert_eq!(text, "{\"feedback\": \"ok\"}");
        let usage = usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.response_tokens, 4);
    }

    #[test]
    fn responses_payload_yields_output_text() {
        let body = json!({
            "output": [{"type": "message", "content": [{"type": "output_text", "text": "hello"}]}]
        });
        let (text, usage) = extract_text_and_usage(&body).unwrap();
        assert_eq!(text, "hello");
        assert!(usage.is_none());
    }

    #[test]
    fn unknown_payload_is_rejected() {
        assert!(extract_text_and_usage(&json!({"error": "nope"})).is_none());
    }

    #[test]
    fn missing_usage_is_estimated() {
        let usage = fill_usage(None, "two words", "three more words");
        assert_eq!(
            usage,
            TokenUsage {
                prompt_tokens: 2,
                response_tokens: 3,
                total_tokens: 5,
            }
        );
    }
}
