use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{LlmBackend, ModelRequest, ModelResponse, OutputItem};
use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::history::{History, Message};
use crate::tools::{ToolCallRequest, ToolDeclaration};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// LLM engine backed by the OpenAI Responses API (`POST /responses`).
///
/// Any endpoint that speaks the same wire format works by pointing
/// `base_url` at it.
///
/// Configuration priority (highest → lowest):
///   1. Environment variables (`OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_BASE_URL`)
///   2. `[llm]` section of `config.toml`
///   3. Built-in defaults
pub struct OpenAiEngine {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_output_tokens: usize,
}

// -- Responses API request/response types ---

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
}

#[derive(Serialize)]
struct FunctionTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<Value>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct MessageItem {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct FunctionCallItem {
    call_id: String,
    name: String,
    #[serde(default)]
    arguments: String,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiEngine {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| {
                if config.llm.api_key.is_empty() {
                    None
                } else {
                    Some(config.llm.api_key.clone())
                }
            })
            .ok_or_else(|| {
                AgentError::Config(
                    "OpenAI API key required: set OPENAI_API_KEY env var \
                     or api_key in the [llm] config section"
                        .into(),
                )
            })?;

        let base_url = std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| {
                if config.llm.base_url.is_empty() {
                    None
                } else {
                    Some(config.llm.base_url.clone())
                }
            })
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let model = std::env::var("OPENAI_MODEL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| config.llm.model.clone());

        Self::with_settings(
            api_key,
            base_url,
            model,
            config.llm.timeout_secs,
            config.llm.max_output_tokens,
        )
    }

    pub fn with_settings(
        api_key: String,
        base_url: String,
        model: String,
        timeout_secs: u64,
        max_output_tokens: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(if timeout_secs > 0 {
                Duration::from_secs(timeout_secs)
            } else {
                Duration::from_secs(300)
            })
            .build()
            .map_err(|e| AgentError::Config(format!("failed to create HTTP client: {e}")))?;

        let base_url = base_url.trim_end_matches('/').to_string();

        info!(
            model = %model,
            base_url = %base_url,
            timeout_secs,
            max_output_tokens,
            "OpenAI engine initialized"
        );

        Ok(Self {
            client,
            api_key,
            base_url,
            model,
            max_output_tokens,
        })
    }

    fn build_request<'a>(&'a self, request: &'a ModelRequest<'_>) -> ResponsesRequest<'a> {
        ResponsesRequest {
            model: &self.model,
            input: history_to_input(request.history),
            tools: request.tools.iter().map(function_tool).collect(),
            max_output_tokens: (self.max_output_tokens > 0).then_some(self.max_output_tokens),
        }
    }
}

#[async_trait::async_trait]
impl LlmBackend for OpenAiEngine {
    fn name(&self) -> &str {
        "OpenAI Responses API"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn respond(&self, request: &ModelRequest<'_>) -> Result<ModelResponse> {
        let url = format!("{}/responses", self.base_url);
        let body = self.build_request(request);

        debug!(
            model = %self.model,
            history_len = request.history.len(),
            tools = request.tools.len(),
            "invoking Responses API"
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Llm(format!("Responses API request failed: {e}")))?;

        let status = resp.status();

        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            let error_msg = extract_error_message(&error_text);

            warn!(status = %status, error = %error_msg, "Responses API error");

            return Err(AgentError::Llm(format!(
                "Responses API returned {status}: {error_msg}"
            )));
        }

        let parsed: ResponsesResponse = resp.json().await.map_err(|e| {
            AgentError::Llm(format!("failed to parse Responses API response: {e}"))
        })?;

        if let Some(ref usage) = parsed.usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                total_tokens = usage.total_tokens,
                "Responses API usage"
            );
        }

        let response = parse_output(parsed.output)?;

        info!(
            items = response.items.len(),
            function_calls = response.function_calls().count(),
            model = %self.model,
            "Responses API response received"
        );

        Ok(response)
    }
}

fn function_tool(decl: &ToolDeclaration) -> FunctionTool<'_> {
    FunctionTool {
        kind: "function",
        name: &decl.name,
        description: &decl.description,
        parameters: &decl.parameters,
    }
}

/// Map the transcript onto Responses API input items.
fn history_to_input(history: &History) -> Vec<Value> {
    history
        .iter()
        .map(|message| match message {
            Message::System { text } => serde_json::json!({"role": "system", "content": text}),
            Message::User { text } => serde_json::json!({"role": "user", "content": text}),
            // Text from a model response goes back as the original output
            // message so reasoning items keep their paired message.
            Message::Assistant {
                text,
                item_id: Some(id),
            } => serde_json::json!({
                "type": "message",
                "id": id,
                "role": "assistant",
                "status": "completed",
                "content": [{"type": "output_text", "text": text, "annotations": []}],
            }),
            Message::Assistant { text, item_id: None } => {
                serde_json::json!({"role": "assistant", "content": text})
            }
            Message::FunctionCall {
                call_id,
                name,
                arguments,
                item_id,
            } => {
                let mut item = serde_json::json!({
                    "type": "function_call",
                    "call_id": call_id,
                    "name": name,
                    "arguments": arguments,
                });
                if let Some(id) = item_id {
                    item["id"] = Value::String(id.clone());
                }
                item
            }
            Message::FunctionResult { call_id, output } => serde_json::json!({
                "type": "function_call_output",
                "call_id": call_id,
                "output": output,
            }),
            Message::Opaque(value) => value.clone(),
        })
        .collect()
}

/// Turn the `output` array into ordered output items.  Unknown item types
/// are kept as opaque values.
fn parse_output(output: Vec<Value>) -> Result<ModelResponse> {
    let mut items = Vec::with_capacity(output.len());
    for raw in output {
        match raw.get("type").and_then(Value::as_str) {
            Some("message") => {
                let message: MessageItem = serde_json::from_value(raw)
                    .map_err(|e| AgentError::Llm(format!("malformed message item: {e}")))?;
                let text = message
                    .content
                    .into_iter()
                    .filter_map(|part| match part.kind.as_str() {
                        "output_text" => part.text,
                        "refusal" => part.refusal,
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                items.push(OutputItem::Text {
                    text,
                    item_id: message.id,
                });
            }
            Some("function_call") => {
                let call: FunctionCallItem = serde_json::from_value(raw)
                    .map_err(|e| AgentError::Llm(format!("malformed function_call item: {e}")))?;
                items.push(OutputItem::FunctionCall(ToolCallRequest {
                    call_id: call.call_id,
                    name: call.name,
                    arguments: call.arguments,
                    item_id: call.id,
                }));
            }
            _ => items.push(OutputItem::Opaque(raw)),
        }
    }
    Ok(ModelResponse::new(items))
}

fn extract_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse { error: Some(e) }) => e.message,
        _ => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> OpenAiEngine {
        OpenAiEngine::with_settings(
            "sk-test".into(),
            "http://localhost:1/v1/".into(),
            "gpt-5-nano".into(),
            5,
            0,
        )
        .unwrap()
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        assert_eq!(engine().base_url, "http://localhost:1/v1");
    }

    #[test]
    fn history_maps_to_input_items() {
        let mut history = History::with_system("sys");
        history.push(Message::user("list files"));
        history.push(Message::FunctionCall {
            call_id: "call_1".into(),
            name: "list_files_in_dir".into(),
            arguments: "{}".into(),
            item_id: Some("fc_1".into()),
        });
        history.push(Message::FunctionResult {
            call_id: "call_1".into(),
            output: r#"{"files":[]}"#.into(),
        });
        history.push(Message::Opaque(serde_json::json!({"type": "reasoning", "id": "rs_1"})));
        history.push(Message::assistant("empty"));

        let input = history_to_input(&history);
        assert_eq!(input.len(), 6);
        assert_eq!(input[0], serde_json::json!({"role": "system", "content": "sys"}));
        assert_eq!(input[2]["type"], "function_call");
        assert_eq!(input[2]["id"], "fc_1");
        assert_eq!(input[3]["type"], "function_call_output");
        assert_eq!(input[3]["call_id"], "call_1");
        assert_eq!(input[4]["type"], "reasoning");
        assert_eq!(input[5]["role"], "assistant");
    }

    #[test]
    fn response_message_is_echoed_with_its_id() {
        let output = vec![
            serde_json::json!({"type": "reasoning", "id": "rs_1", "summary": []}),
            serde_json::json!({
                "type": "message",
                "id": "msg_1",
                "role": "assistant",
                "status": "completed",
                "content": [{"type": "output_text", "text": "Done.", "annotations": []}]
            }),
        ];
        let mut history = History::with_system("sys");
        history.push(Message::user("hi"));
        history.extend(parse_output(output).unwrap().to_messages());

        let input = history_to_input(&history);
        assert_eq!(input.len(), 4);
        assert_eq!(input[2]["type"], "reasoning");
        assert_eq!(
            input[3],
            serde_json::json!({
                "type": "message",
                "id": "msg_1",
                "role": "assistant",
                "status": "completed",
                "content": [{"type": "output_text", "text": "Done.", "annotations": []}]
            })
        );
    }

    #[test]
    fn request_body_includes_function_tools() {
        let engine = engine();
        let history = History::with_system("sys");
        let tools = vec![ToolDeclaration {
            name: "read_file".into(),
            description: "read".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let request = ModelRequest {
            history: &history,
            tools: &tools,
        };
        let body = serde_json::to_value(engine.build_request(&request)).unwrap();
        assert_eq!(body["model"], "gpt-5-nano");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["name"], "read_file");
        assert!(body.get("max_output_tokens").is_none());
    }

    #[test]
    fn parse_output_preserves_order_and_kinds() {
        let output = vec![
            serde_json::json!({"type": "reasoning", "id": "rs_1", "summary": []}),
            serde_json::json!({
                "type": "function_call",
                "id": "fc_1",
                "call_id": "call_1",
                "name": "read_file",
                "arguments": "{\"path\":\"a.txt\"}"
            }),
            serde_json::json!({
                "type": "message",
                "id": "msg_1",
                "role": "assistant",
                "content": [
                    {"type": "output_text", "text": "Hola"},
                    {"type": "output_text", "text": "mundo"}
                ]
            }),
        ];
        let resp = parse_output(output).unwrap();
        assert_eq!(resp.items.len(), 3);
        assert!(matches!(resp.items[0], OutputItem::Opaque(_)));
        match &resp.items[1] {
            OutputItem::FunctionCall(call) => {
                assert_eq!(call.call_id, "call_1");
                assert_eq!(call.item_id.as_deref(), Some("fc_1"));
                assert_eq!(call.arguments, "{\"path\":\"a.txt\"}");
            }
            other => panic!("expected function call, got {other:?}"),
        }
        assert_eq!(
            resp.items[2],
            OutputItem::Text {
                text: "Hola\nmundo".into(),
                item_id: Some("msg_1".into()),
            }
        );
    }

    #[test]
    fn malformed_function_call_is_llm_error() {
        let output = vec![serde_json::json!({"type": "function_call", "name": "x"})];
        assert!(matches!(parse_output(output), Err(AgentError::Llm(_))));
    }

    #[test]
    fn error_message_extracted_from_body() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"bad key"}}"#),
            "bad key"
        );
        assert_eq!(extract_error_message("gateway down"), "gateway down");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_llm_error() {
        let engine = engine();
        let history = History::with_system("sys");
        let request = ModelRequest {
            history: &history,
            tools: &[],
        };
        assert!(matches!(
            engine.respond(&request).await,
            Err(AgentError::Llm(_))
        ));
    }
}
