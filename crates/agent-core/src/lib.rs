//! Runtime crate wiring the concierge orchestrator to its built-in skills
//! and the JSON-backed organizer and memory stores.

pub mod runtime;
pub mod skills;
pub mod store;

pub use runtime::{AgentRuntime, AgentRuntimeBuilder, AgentRuntimeResult, SharedMemory};
pub use skills::{
    register_builtin_skills, AddTodoTool, JournalTool, ListTodosTool, OsInfoTool,
    SharedOrganizer, TimeTool,
};
pub use store::{
    InteractionLog, JournalEntry, MemoryStore, Note, OrganizerStore, StoreError, TodoItem,
};
