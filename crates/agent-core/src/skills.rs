use std::sync::{Arc, Mutex};

use ai_agent::{
    required_str, Category, RegistryError, ToolArguments, ToolDescription, ToolError,
    ToolHandler, ToolOutput, ToolRegistry,
};
use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};
use sysinfo::{System, SystemExt};

use crate::store::OrganizerStore;

pub type SharedOrganizer = Arc<Mutex<OrganizerStore>>;

fn build_description(name: &str, description: &str, schema: Value) -> ToolDescription {
    ToolDescription::new(name, description, schema)
}

pub fn build_text_schema(field: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            field: { "type": "string", "description": description }
        },
        "required": [field],
        "additionalProperties": false
    })
}

pub fn build_empty_schema() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

fn with_organizer<R>(
    organizer: &SharedOrganizer,
    f: impl FnOnce(&mut OrganizerStore) -> R,
) -> Result<R, ToolError> {
    let mut guard = organizer
        .lock()
        .map_err(|_| ToolError::Invocation("organizer store lock poisoned".into()))?;
    Ok(f(&mut guard))
}

pub struct AddTodoTool {
    description: ToolDescription,
    organizer: SharedOrganizer,
}

impl AddTodoTool {
    pub fn new(organizer: SharedOrganizer) -> Self {
        Self {
            description: build_description(
                "add_todo",
                "Add a task to the todo list.",
                build_text_schema("task", "The task to remember"),
            ),
            organizer,
        }
    }
}

#[async_trait]
impl ToolHandler for AddTodoTool {
    fn description(&self) -> &ToolDescription {
        &self.description
    }

    async fn invoke(&self, args: ToolArguments) -> ToolOutput {
        let task = required_str(&args, "task")?.trim();
        if task.is_empty() {
            return Err(ToolError::InvalidInput("task must not be empty".into()));
        }
        with_organizer(&self.organizer, |store| store.add_todo(task))?
            .map_err(|err| ToolError::Invocation(err.to_string()))
    }
}

pub struct ListTodosTool {
    description: ToolDescription,
    organizer: SharedOrganizer,
}

impl ListTodosTool {
    pub fn new(organizer: SharedOrganizer) -> Self {
        Self {
            description: build_description(
                "list_todos",
                "List all todo tasks.",
                build_empty_schema(),
            ),
            organizer,
        }
    }
}

#[async_trait]
impl ToolHandler for ListTodosTool {
    fn description(&self) -> &ToolDescription {
        &self.description
    }

    async fn invoke(&self, _args: ToolArguments) -> ToolOutput {
        with_organizer(&self.organizer, |store| store.list_todos())
    }
}

pub struct JournalTool {
    description: ToolDescription,
    organizer: SharedOrganizer,
}

impl JournalTool {
    pub fn new(organizer: SharedOrganizer) -> Self {
        Self {
            description: build_description(
                "add_journal_entry",
                "Save a journal entry.",
                build_text_schema("entry", "Journal text to save"),
            ),
            organizer,
        }
    }
}

#[async_trait]
impl ToolHandler for JournalTool {
    fn description(&self) -> &ToolDescription {
        &self.description
    }

    async fn invoke(&self, args: ToolArguments) -> ToolOutput {
        let entry = required_str(&args, "entry")?;
        with_organizer(&self.organizer, |store| store.add_journal_entry(entry))?
            .map_err(|err| ToolError::Invocation(err.to_string()))
    }
}

pub struct TimeTool {
    description: ToolDescription,
}

impl TimeTool {
    pub fn new() -> Self {
        Self {
            description: build_description(
                "get_time",
                "Get current date and time.",
                build_empty_schema(),
            ),
        }
    }
}

impl Default for TimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for TimeTool {
    fn description(&self) -> &ToolDescription {
        &self.description
    }

    async fn invoke(&self, _args: ToolArguments) -> ToolOutput {
        Ok(Local::now().format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

pub struct OsInfoTool {
    description: ToolDescription,
}

impl OsInfoTool {
    pub fn new() -> Self {
        Self {
            description: build_description(
                "get_os_info",
                "Get operating system information.",
                build_empty_schema(),
            ),
        }
    }
}

impl Default for OsInfoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for OsInfoTool {
    fn description(&self) -> &ToolDescription {
        &self.description
    }

    async fn invoke(&self, _args: ToolArguments) -> ToolOutput {
        let system = System::new();
        let name = system
            .name()
            .unwrap_or_else(|| std::env::consts::OS.to_string());
        let kernel = system.kernel_version().unwrap_or_default();
        let version = system.os_version().unwrap_or_else(|| "unknown".into());
        Ok(format!(
            "{name} {kernel} ({version}, {})",
            std::env::consts::ARCH
        ))
    }
}

/// Registers the built-in todo and system skills.
pub fn register_builtin_skills(
    registry: &mut ToolRegistry,
    organizer: SharedOrganizer,
) -> Result<(), RegistryError> {
    registry.register(Category::Todo, Arc::new(AddTodoTool::new(organizer.clone())))?;
    registry.register(Category::Todo, Arc::new(ListTodosTool::new(organizer.clone())))?;
    registry.register(Category::Todo, Arc::new(JournalTool::new(organizer)))?;
    registry.register(Category::System, Arc::new(TimeTool::new()))?;
    registry.register(Category::System, Arc::new(OsInfoTool::new()))?;
    Ok(())
}
