//! Backend that replays canned responses, for exercising the dispatch loop
//! and HTTP routes without a network.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::{LlmBackend, ModelRequest, ModelResponse, OutputItem};
use crate::error::{AgentError, Result};
use crate::history::Message;
use crate::tools::ToolCallRequest;

pub enum Step {
    Respond(ModelResponse),
    Fail(String),
}

/// What the backend saw on one call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub history: Vec<Message>,
    pub tool_names: Vec<String>,
}

pub struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn respond(&self, request: &ModelRequest<'_>) -> Result<ModelResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            history: request.history.messages().to_vec(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
        });
        match self.steps.lock().unwrap().pop_front() {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(msg)) => Err(AgentError::Llm(msg)),
            None => Err(AgentError::Llm("script exhausted".into())),
        }
    }
}

pub fn reply(text: &str) -> Step {
    Step::Respond(ModelResponse::text(text))
}

pub fn calls(calls: &[(&str, &str, serde_json::Value)]) -> Step {
    Step::Respond(ModelResponse::new(
        calls
            .iter()
            .map(|(id, name, args)| {
                OutputItem::FunctionCall(ToolCallRequest {
                    call_id: id.to_string(),
                    name: name.to_string(),
                    arguments: args.to_string(),
                    item_id: None,
                })
            })
            .collect(),
    ))
}
