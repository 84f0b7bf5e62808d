//! Core orchestration primitives for the concierge agent.
//! The crate classifies each user turn into an intent category, binds the
//! tools registered for that category, and runs the think/act/observe loop
//! against any [`LanguageModelClient`] until the model answers without
//! requesting further tool calls.

pub mod category;
pub mod classifier;
pub mod conversation;
pub mod language_model;
pub mod openai;
pub mod options;
pub mod orchestrator;
pub mod registry;
pub mod tool;
pub mod usage;

#[cfg(test)]
mod test_support;

pub use category::Category;
pub use classifier::{Classification, ClassifierConfig, IntentClassifier};
pub use conversation::{
    AssistantMessage, ConversationError, ConversationState, Message, Role, ToolCall,
};
pub use language_model::{LanguageModelClient, LanguageModelResponse, LanguageModelUsage};
pub use openai::ChatCompletionsClient;
pub use options::ModelOptions;
pub use orchestrator::{
    AgentConfig, AgentError, AgentEvent, AgentOrchestrator, TurnOutcome, TurnPhase,
    TOOL_LIMIT_MESSAGE,
};
pub use registry::{RegistryError, ToolRecord, ToolRegistry};
pub use tool::{
    required_str, FnTool, ToolArguments, ToolDescription, ToolError, ToolHandler, ToolOutput,
};
pub use usage::{UsageRecord, UsageTracker};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;
