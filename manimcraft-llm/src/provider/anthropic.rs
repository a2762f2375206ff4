//! Anthropic Claude provider implementation

use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ProviderError::AuthenticationFailed);
        }
        let client = http_client(&config)?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or("https://api.anthropic.com/v1")
    }

    /// Translate a provider-neutral request into the Messages API body
    fn build_request(&self, request: &CompletionRequest) -> AnthropicRequest {
        let model = request.model.as_deref().unwrap_or(self.default_model());

        // System messages travel outside the turn list
        let mut system = None;
        let mut messages = Vec::new();
        for msg in &request.messages {
            if msg.role == Role::System {
                system = msg.content.clone();
            } else {
                messages.push(AnthropicMessage::from(msg));
            }
        }

        AnthropicRequest {
            model: model.to_string(),
            messages,
            system,
            max_tokens: request.max_tokens.unwrap_or(4096),
            temperature: request.temperature,
            tools: request.tools.as_ref().map(|tools| {
                tools.iter().map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                }).collect()
            }),
            tool_choice: request.tool_choice.as_ref().map(|tc| match tc {
                ToolChoice::Auto => serde_json::json!({ "type": "auto" }),
                ToolChoice::None => serde_json::json!({ "type": "none" }),
            }),
        }
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or("claude-3-7-sonnet-20250219")
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let api_request = self.build_request(&request);
        debug!(
            model = %api_request.model,
            turns = api_request.messages.len(),
            "sending anthropic messages request"
        );

        let api_key = self.config.api_key.as_ref()
            .ok_or(ProviderError::AuthenticationFailed)?;

        let mut req = self.client
            .post(format!("{}/messages", self.base_url()))
            .header("x-api-key", api_key)
            .header("content-type", "application/json")
            .json(&api_request);

        if !self.config.headers.contains_key("anthropic-version") {
            req = req.header("anthropic-version", "2023-06-01");
        }
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req.send().await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = retry_after_secs(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, retry_after, text));
        }

        let api_response: AnthropicResponse = response.json().await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(api_response.into_completion())
    }
}

impl AnthropicResponse {
    fn into_completion(self) -> CompletionResponse {
        // Text blocks are concatenated, tool_use blocks keep their order
        let mut content = String::new();
        let mut tool_calls = Vec::new();

        for block in self.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall {
                        id,
                        name,
                        arguments: input.to_string(),
                    });
                }
                ContentBlock::Other => {}
            }
        }

        let finish_reason = match self.stop_reason.as_deref() {
            Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            Some("tool_use") => FinishReason::ToolCalls,
            _ => FinishReason::Unknown,
        };

        let cached_tokens = self.usage.cache_read_input_tokens.unwrap_or(0);
        let usage = Usage {
            prompt_tokens: self.usage.input_tokens,
            completion_tokens: self.usage.output_tokens,
            total_tokens: self.usage.input_tokens + self.usage.output_tokens,
            cached_tokens,
        };

        CompletionResponse {
            id: self.id,
            model: self.model,
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls,
            finish_reason,
            usage,
        }
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: ImageSource },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl CacheControl {
    fn ephemeral() -> Self {
        Self { kind: "ephemeral" }
    }
}

impl From<&ChatMessage> for AnthropicMessage {
    fn from(msg: &ChatMessage) -> Self {
        let text = msg.content.clone().unwrap_or_default();

        match msg.role {
            Role::Tool => Self {
                role: "user",
                content: AnthropicContent::Blocks(vec![AnthropicContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: text,
                    cache_control: msg.cache.then(CacheControl::ephemeral),
                }]),
            },
            Role::Assistant if msg.has_tool_calls() => {
                let mut blocks = Vec::new();
                if !text.is_empty() {
                    blocks.push(AnthropicContentBlock::Text { text });
                }
                for call in msg.tool_calls.iter().flatten() {
                    blocks.push(AnthropicContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        // The API wants an object even when the model sent garbage
                        input: serde_json::from_str(&call.arguments)
                            .unwrap_or_else(|_| serde_json::json!({})),
                    });
                }
                Self {
                    role: "assistant",
                    content: AnthropicContent::Blocks(blocks),
                }
            }
            Role::Assistant => Self {
                role: "assistant",
                content: AnthropicContent::Text(text),
            },
            Role::User | Role::System if !msg.images.is_empty() => {
                let mut blocks: Vec<_> = msg.images.iter().map(|image| {
                    AnthropicContentBlock::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type: image.media_type.clone(),
                            data: image.data.clone(),
                        },
                    }
                }).collect();
                blocks.push(AnthropicContentBlock::Text { text });
                Self {
                    role: "user",
                    content: AnthropicContent::Blocks(blocks),
                }
            }
            Role::User | Role::System => Self {
                role: "user",
                content: AnthropicContent::Text(text),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// thinking, redacted_thinking and future block types
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
    #[serde(default)]
    cache_read_input_tokens: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(ProviderConfig::anthropic("sk-ant-test")).unwrap()
    }

    fn lookup_call() -> ToolCall {
        ToolCall {
            id: "toolu_01".into(),
            name: "get_specific_documentation_info".into(),
            arguments: r#"{"url":"https://docs.manim.community/en/stable/index.html"}"#.into(),
        }
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let mut config = ProviderConfig::anthropic("");
        assert!(matches!(AnthropicProvider::new(config.clone()), Err(ProviderError::AuthenticationFailed)));
        config.api_key = None;
        assert!(AnthropicProvider::new(config).is_err());
    }

    #[test]
    fn test_system_prompt_is_lifted_out() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("You are an expert at Manim"),
            ChatMessage::user("Explain gradient descent"),
        ]);
        let body = serde_json::to_value(provider().build_request(&request)).unwrap();

        assert_eq!(body["system"], "You are an expert at Manim");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Explain gradient descent");
        assert_eq!(body["model"], "claude-3-7-sonnet-20250219");
    }

    #[test]
    fn test_tool_round_trip_encoding() {
        let request = CompletionRequest::new(vec![
            ChatMessage::user("Explain gradient descent"),
            ChatMessage::assistant_tool_call(Some("Let me check the docs.".into()), lookup_call()),
            ChatMessage::tool_result("toolu_01", "page text").cacheable(),
            ChatMessage::tool_result("toolu_02", "more text"),
        ])
        .with_tools(vec![ToolDefinition::new("get_specific_documentation_info", "docs")])
        .with_tool_choice(ToolChoice::None);
        let body = serde_json::to_value(provider().build_request(&request)).unwrap();

        let assistant = &body["messages"][1];
        assert_eq!(assistant["role"], "assistant");
        assert_eq!(assistant["content"][0]["type"], "text");
        assert_eq!(assistant["content"][1]["type"], "tool_use");
        assert_eq!(assistant["content"][1]["id"], "toolu_01");
        assert_eq!(
            assistant["content"][1]["input"]["url"],
            "https://docs.manim.community/en/stable/index.html"
        );

        let cached = &body["messages"][2]["content"][0];
        assert_eq!(body["messages"][2]["role"], "user");
        assert_eq!(cached["type"], "tool_result");
        assert_eq!(cached["tool_use_id"], "toolu_01");
        assert_eq!(cached["cache_control"]["type"], "ephemeral");

        let uncached = &body["messages"][3]["content"][0];
        assert!(uncached.get("cache_control").is_none());

        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["tool_choice"]["type"], "none");
    }

    #[test]
    fn test_images_precede_text() {
        let request = CompletionRequest::new(vec![ChatMessage::user("Turn these pages into a tutorial")
            .with_images(vec![ImageAttachment::from_bytes("image/png", b"png")])]);
        let body = serde_json::to_value(provider().build_request(&request)).unwrap();

        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "image/png");
        assert_eq!(content[1]["type"], "text");
    }

    #[test]
    fn test_response_decoding() {
        let raw = serde_json::json!({
            "id": "msg_01",
            "model": "claude-3-7-sonnet-20250219",
            "stop_reason": "tool_use",
            "content": [
                { "type": "thinking", "thinking": "hmm", "signature": "x" },
                { "type": "text", "text": "Looking up Circle." },
                { "type": "tool_use", "id": "toolu_01", "name": "get_specific_documentation_info",
                  "input": { "url": "https://docs.manim.community/en/stable/index.html" } }
            ],
            "usage": { "input_tokens": 1200, "output_tokens": 40, "cache_read_input_tokens": 900 }
        });
        let response: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let completion = response.into_completion();

        assert_eq!(completion.finish_reason, FinishReason::ToolCalls);
        assert_eq!(completion.content.as_deref(), Some("Looking up Circle."));
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].id, "toolu_01");
        assert!(completion.tool_calls[0].arguments.contains("docs.manim.community"));
        assert_eq!(completion.usage.cached_tokens, 900);
        assert_eq!(completion.usage.total_tokens, 1240);
    }
}
