use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::{AssistantMessage, Message};
use crate::options::ModelOptions;
use crate::tool::ToolDescription;

/// Token metadata as reported by the service. Every field is optional since
/// providers omit usage entirely on some responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageModelUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl LanguageModelUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32, total_tokens: u32) -> Self {
        Self {
            prompt_tokens: Some(prompt_tokens),
            completion_tokens: Some(completion_tokens),
            total_tokens: Some(total_tokens),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_tokens.is_none()
            && self.completion_tokens.is_none()
            && self.total_tokens.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageModelResponse {
    pub message: AssistantMessage,
    pub usage: LanguageModelUsage,
}

impl LanguageModelResponse {
    pub fn new(message: AssistantMessage) -> Self {
        Self {
            message,
            usage: LanguageModelUsage::default(),
        }
    }

    pub fn with_usage(mut self, usage: LanguageModelUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Stateless inference service: the full conversation and the bound tool
/// schema are sent on every call. An empty `tools` slice must leave the model
/// unable to request calls.
#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    async fn complete(
        &self,
        conversation: &[Message],
        tools: &[ToolDescription],
        options: &ModelOptions,
    ) -> Result<LanguageModelResponse>;
}
