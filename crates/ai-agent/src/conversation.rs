use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tool::ToolArguments;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    ToolResult,
}

/// A call requested by the model. `id` is unique within one assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: ToolArguments,
    /// Set when the model's arguments could not be decoded. Such a call is
    /// answered with an error result instead of being invoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument_error: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            argument_error: None,
        }
    }

    pub fn malformed(
        id: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: ToolArguments::new(),
            argument_error: Some(reason.into()),
        }
    }
}

/// What the inference service returns for one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("tool result for {got} does not answer the next pending call ({expected:?})")]
    UnexpectedToolResult {
        expected: Option<String>,
        got: String,
    },
    #[error("{0} tool call(s) are still awaiting results")]
    PendingToolCalls(usize),
    #[error("assistant message repeats tool call id {0}")]
    DuplicateCallId(String),
}

/// Append-only message log replayed to the model on every inference call.
///
/// The first message is always the system preamble. Tool results must answer
/// the calls of the preceding assistant message one by one, in request order.
#[derive(Debug, Clone)]
pub struct ConversationState {
    messages: Vec<Message>,
    pending: VecDeque<String>,
}

impl ConversationState {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::plain(Role::System, system_prompt.into())],
            pending: VecDeque::new(),
        }
    }

    pub fn append_user(&mut self, text: impl Into<String>) -> Result<(), ConversationError> {
        self.ensure_settled()?;
        self.messages.push(Message::plain(Role::User, text.into()));
        Ok(())
    }

    pub fn append_assistant(&mut self, message: AssistantMessage) -> Result<(), ConversationError> {
        self.ensure_settled()?;
        let mut ids: VecDeque<String> = VecDeque::with_capacity(message.tool_calls.len());
        for call in &message.tool_calls {
            if ids.contains(&call.id) {
                return Err(ConversationError::DuplicateCallId(call.id.clone()));
            }
            ids.push_back(call.id.clone());
        }
        self.pending = ids;
        self.messages.push(Message {
            role: Role::Assistant,
            content: message.content,
            tool_calls: message.tool_calls,
            tool_call_id: None,
        });
        Ok(())
    }

    pub fn append_tool_result(
        &mut self,
        call_id: &str,
        text: impl Into<String>,
    ) -> Result<(), ConversationError> {
        if self.pending.front().map(String::as_str) != Some(call_id) {
            return Err(ConversationError::UnexpectedToolResult {
                expected: self.pending.front().cloned(),
                got: call_id.to_string(),
            });
        }
        self.pending.pop_front();
        self.messages.push(Message {
            role: Role::ToolResult,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.to_string()),
        });
        Ok(())
    }

    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn system_prompt(&self) -> &str {
        &self.messages[0].content
    }

    pub fn pending_calls(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        // The preamble is always present.
        false
    }

    fn ensure_settled(&self) -> Result<(), ConversationError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(ConversationError::PendingToolCalls(self.pending.len()))
        }
    }
}
