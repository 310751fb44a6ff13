use serde::{Deserialize, Serialize};

/// One entry in a session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    System {
        text: String,
    },
    User {
        text: String,
    },
    Assistant {
        text: String,
        /// Provider-side message id, when the text came from a model response.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
    },
    /// A function call emitted by the model, echoed back on later requests.
    FunctionCall {
        call_id: String,
        name: String,
        /// Raw JSON argument text exactly as the model produced it.
        arguments: String,
        /// Provider-side item id, when the provider assigns one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
    },
    FunctionResult {
        call_id: String,
        output: String,
    },
    /// Provider output item the agent does not interpret (e.g. reasoning)
    /// but must send back unchanged.
    Opaque(serde_json::Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    ToolCall,
    ToolResult,
    Opaque,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System { text: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            text: text.into(),
            item_id: None,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::FunctionCall { .. } => Role::ToolCall,
            Self::FunctionResult { .. } => Role::ToolResult,
            Self::Opaque(_) => Role::Opaque,
        }
    }
}

/// Append-only conversation transcript.
///
/// Entries are only ever pushed; nothing hands out mutable access to stored
/// messages, so the order a provider sees is exactly the order of arrival.
#[derive(Debug, Clone, Default)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a history with a system instruction as its first entry.
    pub fn with_system(instructions: impl Into<String>) -> Self {
        let mut history = Self::new();
        history.push(Message::system(instructions));
        history
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
