pub mod openai;
pub mod prompts;
#[cfg(test)]
pub mod scripted;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::history::{History, Message};
use crate::tools::{ToolCallRequest, ToolDeclaration};

pub use openai::OpenAiEngine;

/// Everything sent to the model for one turn.
pub struct ModelRequest<'a> {
    /// Full transcript, system instruction first.
    pub history: &'a History,
    /// Function declarations the model may call.
    pub tools: &'a [ToolDeclaration],
}

/// One item of model output, in the order the provider produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputItem {
    /// Assistant text; `item_id` is the provider's message id, if any.
    Text {
        text: String,
        item_id: Option<String>,
    },
    FunctionCall(ToolCallRequest),
    /// Provider item with no meaning to the agent, echoed back verbatim.
    Opaque(serde_json::Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub items: Vec<OutputItem>,
}

impl ModelResponse {
    pub fn new(items: Vec<OutputItem>) -> Self {
        Self { items }
    }

    #[cfg(test)]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![OutputItem::Text {
            text: text.into(),
            item_id: None,
        }])
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &ToolCallRequest> {
        self.items.iter().filter_map(|item| match item {
            OutputItem::FunctionCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn has_function_calls(&self) -> bool {
        self.function_calls().next().is_some()
    }

    /// Assistant text of the response, parts joined by newlines.
    pub fn joined_text(&self) -> String {
        self.items
            .iter()
            .filter_map(|item| match item {
                OutputItem::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// History entries for this response, one per item, in order.
    pub fn to_messages(&self) -> Vec<Message> {
        self.items
            .iter()
            .map(|item| match item {
                OutputItem::Text { text, item_id } => Message::Assistant {
                    text: text.clone(),
                    item_id: item_id.clone(),
                },
                OutputItem::FunctionCall(call) => Message::FunctionCall {
                    call_id: call.call_id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    item_id: call.item_id.clone(),
                },
                OutputItem::Opaque(value) => Message::Opaque(value.clone()),
            })
            .collect()
    }
}

/// A remote model that can take one conversational turn.
#[async_trait::async_trait]
pub trait LlmBackend: Send + Sync {
    /// Human-readable name of this backend (e.g. "OpenAI Responses API").
    fn name(&self) -> &str;

    /// Model identifier requests are sent with.
    fn model(&self) -> &str;

    /// Send the request and return the model's output items.  Any failure
    /// here is a transport failure from the agent's point of view.
    async fn respond(&self, request: &ModelRequest<'_>) -> Result<ModelResponse>;
}

/// Build the configured backend.
pub fn build_backend(config: &Config) -> Result<Arc<dyn LlmBackend>> {
    Ok(Arc::new(OpenAiEngine::new(config)?))
}
