//! Generative-text backend.
//!
//! `ChatBackend` is the seam between the chat-turn driver and whatever produces
//! assistant text: the OpenAI-compatible client below on the server, an HTTP
//! client for the server's `/chef` endpoint in the CLI, fakes in tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::config::LlmConfig;
use crate::error::SousError;
use crate::models::{PromptMessage, Role};
use crate::stream::TextStream;

pub const GENERATION_PROMPT: &str = r#"You are 'SousAI', a world-class AI sous-chef, designed to act as a friendly, knowledgeable, and encouraging cooking partner. Your primary goal is to have a natural, free-flowing conversation to help a user decide what to cook. When the user is happy with the recipe and wants to save it, you MUST respond with a valid JSON object in this exact format:

{
  "title": "Recipe Title",
  "description": "A brief description of the recipe",
  "ingredients": [
    { "name": "Ingredient 1", "amount": "1 cup" },
    { "name": "Ingredient 2", "amount": "2 tablespoons" }
  ],
  "instructions": [
    "Step 1 instruction",
    "Step 2 instruction"
  ],
  "prep_time": 15,
  "cook_time": 30,
  "servings": 4,
  "notes": {
    "emoji": "🍳",
    "text": "Any special notes or tips"
  }
}

The JSON must be wrapped in a markdown code block with the json language specifier, like this:
```json
{
  // recipe json here
}
```
"#;

pub const COOKING_PROMPT: &str = r#"You are the 'SousAI Cooking Assistant'. You are a calm, expert, and reassuring guide.
The user is cooking a recipe they previously created with you. You have been provided the full chat history of the recipe's creation.

Your core job:
1. Act as a guide. Reference the original conversation and the recipe notes, e.g. "Remember we decided to..." or "The notes mention you liked it spicy, so let's...".
2. Be conversational. Give clear, step-by-step instructions. Answer questions about substitutions, timings, or techniques.
3. Stay in character. You are an assistant, not a generator. NEVER output JSON or code. Respond with conversational text ONLY."#;

/// Prompt mode for one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatMode {
    #[default]
    Generation,
    #[serde(alias = "cook")]
    CookingHelp,
}

impl ChatMode {
    pub fn system_prompt(&self) -> &'static str {
        match self {
            ChatMode::Generation => GENERATION_PROMPT,
            ChatMode::CookingHelp => COOKING_PROMPT,
        }
    }
}

/// Body of a `/chef` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChefRequest {
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub chat_mode: ChatMode,
    pub messages: Vec<PromptMessage>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start a streamed completion. Errors before the first byte are returned
    /// here; errors mid-stream arrive as stream items.
    async fn stream_chat(&self, request: &ChefRequest) -> Result<TextStream, SousError>;

    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI-compatible API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// OpenAiClient
// ============================================================================

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    nutrition_model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self, SousError> {
        let api_key = api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();
        if api_key.is_empty() {
            return Err(SousError::Other("Missing OPENAI_API_KEY".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            nutrition_model: config.nutrition_model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn nutrition_model(&self) -> &str {
        &self.nutrition_model
    }

    fn wire_messages<'a>(system: &'a str, messages: &'a [PromptMessage]) -> Vec<WireMessage<'a>> {
        std::iter::once(WireMessage {
            role: Role::System.as_str(),
            content: system,
        })
        .chain(messages.iter().map(|m| WireMessage {
            role: m.role.as_str(),
            content: &m.content,
        }))
        .collect()
    }

    async fn post(&self, body: &CompletionRequest<'_>) -> Result<reqwest::Response, SousError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);
            tracing::error!(code = status.as_u16(), message = %message, "Model API error");
            return Err(SousError::Network(format!(
                "model API returned {}: {}",
                status.as_u16(),
                message
            )));
        }
        Ok(response)
    }

    /// Non-streamed completion that must answer with a JSON object.
    pub async fn complete_json(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<serde_json::Value, SousError> {
        let messages = [PromptMessage {
            role: Role::User,
            content: prompt.to_string(),
        }];
        let body = CompletionRequest {
            model: &self.nutrition_model,
            messages: Self::wire_messages(system, &messages),
            temperature: 0.0,
            stream: false,
            response_format: Some(serde_json::json!({"type": "json_object"})),
        };

        let response: CompletionResponse = self.post(&body).await?.json().await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SousError::Network("model returned no content".to_string()))?;

        serde_json::from_str(&content)
            .map_err(|e| SousError::Network(format!("model returned malformed JSON: {}", e)))
    }
}

#[async_trait]
impl ChatBackend for OpenAiClient {
    async fn stream_chat(&self, request: &ChefRequest) -> Result<TextStream, SousError> {
        let body = CompletionRequest {
            model: &self.chat_model,
            messages: Self::wire_messages(request.chat_mode.system_prompt(), &request.messages),
            temperature: self.temperature,
            stream: true,
            response_format: None,
        };

        let response = self.post(&body).await?;
        tracing::debug!(model = %self.chat_model, mode = ?request.chat_mode, "Streaming completion started");

        let deltas = response
            .bytes_stream()
            .scan(SseDecoder::default(), |decoder, chunk| {
                let items: Vec<Result<Bytes, SousError>> = match chunk {
                    Ok(bytes) => decoder
                        .feed(&bytes)
                        .into_iter()
                        .map(|delta| Ok(Bytes::from(delta)))
                        .collect(),
                    Err(e) => vec![Err(SousError::Network(e.to_string()))],
                };
                futures::future::ready(Some(futures::stream::iter(items)))
            })
            .flatten();

        Ok(deltas.boxed())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Turns server-sent-event bytes into content deltas. Lines may straddle chunks,
/// so incomplete trailing lines are held back until the next feed.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut deltas = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data == "[DONE]" {
                continue;
            }
            match serde_json::from_str::<StreamChunk>(data) {
                Ok(chunk) => deltas.extend(
                    chunk
                        .choices
                        .into_iter()
                        .filter_map(|c| c.delta.content)
                        .filter(|c| !c.is_empty()),
                ),
                Err(e) => tracing::debug!(error = %e, "Skipping unparseable stream event"),
            }
        }

        deltas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::collect_text;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base: String) -> LlmConfig {
        LlmConfig {
            api_base: base,
            chat_model: "gpt-4".to_string(),
            nutrition_model: "gpt-4o".to_string(),
            timeout_seconds: 5,
            temperature: 0.7,
        }
    }

    fn sse_body(deltas: &[&str]) -> String {
        let mut body = String::new();
        for d in deltas {
            let event = serde_json::json!({"choices": [{"delta": {"content": d}}]});
            body.push_str(&format!("data: {}\n\n", event));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[test]
    fn test_sse_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();
        let body = sse_body(&["Hel", "lo"]);
        let (a, b) = body.split_at(body.len() / 2);
        let mut out = decoder.feed(a.as_bytes());
        out.extend(decoder.feed(b.as_bytes()));
        assert_eq!(out.concat(), "Hello");
    }

    #[test]
    fn test_sse_decoder_ignores_role_only_and_comments() {
        let mut decoder = SseDecoder::default();
        let out = decoder.feed(
            b": keep-alive\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\ndata: [DONE]\n",
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_cook_alias_maps_to_cooking_help() {
        let mode: ChatMode = serde_json::from_str("\"cook\"").unwrap();
        assert_eq!(mode, ChatMode::CookingHelp);
        let mode: ChatMode = serde_json::from_str("\"cooking-help\"").unwrap();
        assert_eq!(mode, ChatMode::CookingHelp);
        assert!(ChatMode::CookingHelp.system_prompt().contains("NEVER output JSON"));
        assert!(ChatMode::Generation.system_prompt().contains("```json"));
    }

    #[test]
    fn test_missing_api_key_is_error() {
        let config = test_config("http://localhost".to_string());
        assert!(OpenAiClient::new(&config, Some(String::new())).is_err());
    }

    #[tokio::test]
    async fn test_stream_chat_yields_concatenated_deltas() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4", "stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(&["Sure! ", "How about ", "soup?"])),
            )
            .mount(&mock_server)
            .await;

        let client =
            OpenAiClient::new(&test_config(mock_server.uri()), Some("test-key".to_string()))
                .unwrap();
        let request = ChefRequest {
            user_id: None,
            chat_mode: ChatMode::Generation,
            messages: vec![PromptMessage {
                role: Role::User,
                content: "dinner ideas?".to_string(),
            }],
            session_id: None,
        };

        let stream = client.stream_chat(&request).await.unwrap();
        let text = collect_text(stream, Duration::from_secs(5)).await.unwrap();
        assert_eq!(text, "Sure! How about soup?");
    }

    #[tokio::test]
    async fn test_stream_chat_non_ok_is_network_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": {"message": "upstream exploded"}
            })))
            .mount(&mock_server)
            .await;

        let client =
            OpenAiClient::new(&test_config(mock_server.uri()), Some("test-key".to_string()))
                .unwrap();
        let request = ChefRequest {
            user_id: None,
            chat_mode: ChatMode::CookingHelp,
            messages: vec![],
            session_id: None,
        };

        match client.stream_chat(&request).await {
            Err(SousError::Network(msg)) => assert!(msg.contains("upstream exploded")),
            Err(other) => panic!("expected network error, got {:?}", other),
            Ok(_) => panic!("expected network error, got a stream"),
        }
    }

    #[tokio::test]
    async fn test_complete_json_parses_content() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "stream": false,
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"answer\": 42}"}}]
            })))
            .mount(&mock_server)
            .await;

        let client =
            OpenAiClient::new(&test_config(mock_server.uri()), Some("test-key".to_string()))
                .unwrap();
        let value = client.complete_json("system", "question").await.unwrap();
        assert_eq!(value["answer"], 42);
    }
}
