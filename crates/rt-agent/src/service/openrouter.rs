//! OpenRouter chat-completions client

use std::time::Duration;

use async_trait::async_trait;
use rt_core::config::AgentSettings;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Completion, CompletionRequest, ReasoningService, Usage};
use crate::error::ServiceError;
use crate::turn::{ToolCall, Turn};

const REFERER: &str = "https://github.com/Adiaslow/relay-terminal";
const TITLE: &str = "Relay Terminal";

/// [`ReasoningService`] over the OpenRouter HTTP API
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    timeout: Duration,
}

impl OpenRouterClient {
    /// Build a client from agent settings.
    ///
    /// Fails when no API key is configured or set in the environment.
    pub fn from_settings(settings: &AgentSettings) -> Result<Self, ServiceError> {
        let api_key = settings
            .resolve_api_key()
            .ok_or_else(|| ServiceError::MissingApiKey(settings.api_key_env.clone()))?;
        Self::new(&settings.api_base, api_key, settings.request_timeout)
    }

    pub fn new(
        api_base: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::Timeout(self.timeout)
        } else {
            ServiceError::Http(err)
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        tracing::error!("API error: {} - {}", status, body);
        Err(ServiceError::Status { status, body })
    }
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

/// Chat messages in the OpenAI wire format
fn wire_messages(request: &CompletionRequest) -> Vec<Value> {
    let mut messages = Vec::with_capacity(request.turns.len() + 1);
    messages.push(json!({ "role": "system", "content": request.system }));
    for turn in &request.turns {
        let message = match turn {
            Turn::User { content } => json!({ "role": "user", "content": content }),
            Turn::Assistant { text, tool_calls } if tool_calls.is_empty() => {
                json!({ "role": "assistant", "content": text.as_deref().unwrap_or_default() })
            }
            Turn::Assistant { text, tool_calls } => {
                let calls: Vec<WireToolCall<'_>> = tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: &call.id,
                        kind: "function",
                        function: WireFunction {
                            name: &call.name,
                            arguments: &call.arguments,
                        },
                    })
                    .collect();
                json!({
                    "role": "assistant",
                    "content": text.as_deref().unwrap_or_default(),
                    "tool_calls": calls,
                })
            }
            Turn::ToolResult {
                call_id, content, ..
            } => json!({ "role": "tool", "tool_call_id": call_id, "content": content }),
        };
        messages.push(message);
    }
    messages
}

fn request_body(request: &CompletionRequest) -> Value {
    let tools: Vec<Value> = request.tools.iter().map(|t| t.to_json()).collect();
    let mut body = json!({
        "model": request.model,
        "messages": wire_messages(request),
        "usage": { "include": true },
    });
    if !tools.is_empty() {
        body["tools"] = Value::Array(tools);
        body["tool_choice"] = json!("auto");
        body["provider"] = json!({ "require_parameters": true, "allow_fallbacks": true });
    }
    body
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    id: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    cost: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    data: Option<GenerationData>,
}

#[derive(Debug, Deserialize)]
struct GenerationData {
    total_cost: Option<f64>,
}

fn into_completion(response: ChatResponse) -> Result<Completion, ServiceError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::InvalidResponse("empty response".to_string()))?;
    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(i, call)| {
            let id = if call.id.is_empty() {
                format!("call_{}", i)
            } else {
                call.id
            };
            ToolCall::new(id, call.function.name, call.function.arguments)
        })
        .collect();
    Ok(Completion {
        id: response.id,
        text: choice.message.content.filter(|c| !c.is_empty()),
        tool_calls,
        usage: response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            cost: u.cost,
        }),
    })
}

#[async_trait]
impl ReasoningService for OpenRouterClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ServiceError> {
        tracing::debug!(
            "Calling {} with {} turns",
            request.model,
            request.turns.len()
        );
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check(response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(format!("failed to parse response: {}", e)))?;
        into_completion(parsed)
    }

    async fn lookup_cost(&self, call_id: &str) -> Result<Option<f64>, ServiceError> {
        let response = self
            .client
            .get(format!("{}/generation", self.api_base))
            .query(&[("id", call_id)])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check(response).await?;
        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(format!("failed to parse generation: {}", e)))?;
        Ok(parsed.data.and_then(|d| d.total_cost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool_specs;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test/model".into(),
            system: "be helpful".into(),
            turns: vec![
                Turn::user("uptime?"),
                Turn::Assistant {
                    text: None,
                    tool_calls: vec![ToolCall::new("c1", "run_command", r#"{"command":"uptime"}"#)],
                },
                Turn::tool_result("c1", "up 3 days", false),
            ],
            tools: tool_specs(),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let body = request_body(&request());
        assert_eq!(body["model"], "test/model");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "run_command");

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["tool_calls"][0]["id"], "c1");
        assert_eq!(messages[2]["tool_calls"][0]["type"], "function");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "c1");
    }

    #[test]
    fn test_parse_tool_call_response() {
        let raw = r#"{
            "id": "gen-42",
            "choices": [{"message": {"content": "",
                "tool_calls": [{"id": "t1", "type": "function",
                    "function": {"name": "run_command", "arguments": "{\"command\":\"df -h\"}"}}]}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 15}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let completion = into_completion(parsed).unwrap();

        assert_eq!(completion.id.as_deref(), Some("gen-42"));
        assert_eq!(completion.text, None);
        assert_eq!(completion.tool_calls[0].name, "run_command");
        let usage = completion.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 120);
        assert_eq!(usage.cost, None);
    }

    #[test]
    fn test_empty_choices_is_invalid() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            into_completion(parsed),
            Err(ServiceError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_missing_api_key() {
        let settings = AgentSettings {
            api_key: None,
            api_key_env: "RELAY_TEST_UNSET_KEY".into(),
            ..AgentSettings::default()
        };
        assert!(matches!(
            OpenRouterClient::from_settings(&settings),
            Err(ServiceError::MissingApiKey(_))
        ));
    }
}
