use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {path} is not valid JSON: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("store encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Whole-file JSON document, rewritten after every append.
#[derive(Debug)]
struct JsonFile<T> {
    path: PathBuf,
    data: T,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let data = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| StoreError::Decode {
                path: path.clone(),
                source,
            })?
        } else {
            T::default()
        };
        Ok(Self { path, data })
    }

    /// Applies `change` to a copy and writes it out. The loaded data is only
    /// replaced once the write succeeded.
    fn commit(&mut self, change: impl FnOnce(&mut T)) -> Result<(), StoreError>
    where
        T: Clone,
    {
        let mut next = self.data.clone();
        change(&mut next);
        let serialized = serde_json::to_string_pretty(&next)?;
        fs::write(&self.path, serialized).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.data = next;
        Ok(())
    }
}

fn timestamp() -> String {
    Local::now().to_rfc3339()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub task: String,
    pub completed: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OrganizerData {
    #[serde(default)]
    todos: Vec<TodoItem>,
    #[serde(default)]
    journal: Vec<JournalEntry>,
}

/// Todo list and journal persisted to `organizer.json`.
#[derive(Debug)]
pub struct OrganizerStore {
    file: JsonFile<OrganizerData>,
}

impl OrganizerStore {
    pub const FILE_NAME: &'static str = "organizer.json";

    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            file: JsonFile::open(data_dir.join(Self::FILE_NAME))?,
        })
    }

    pub fn add_todo(&mut self, task: &str) -> Result<String, StoreError> {
        let item = TodoItem {
            task: task.to_string(),
            completed: false,
            created_at: timestamp(),
        };
        self.file.commit(|data| data.todos.push(item))?;
        Ok(format!("Added todo: {task}"))
    }

    pub fn pending_todos(&self) -> impl Iterator<Item = &TodoItem> {
        self.file.data.todos.iter().filter(|todo| !todo.completed)
    }

    pub fn list_todos(&self) -> String {
        let lines: Vec<String> = self
            .pending_todos()
            .map(|todo| format!("- {}", todo.task))
            .collect();
        if lines.is_empty() {
            "No pending tasks.".to_string()
        } else {
            lines.join("\n")
        }
    }

    pub fn add_journal_entry(&mut self, entry: &str) -> Result<String, StoreError> {
        let item = JournalEntry {
            entry: entry.to_string(),
            timestamp: timestamp(),
        };
        self.file.commit(|data| data.journal.push(item))?;
        Ok("Journal entry saved.".to_string())
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.file.data.journal
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub timestamp: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionLog {
    pub timestamp: String,
    pub user: String,
    pub agent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemoryData {
    #[serde(default)]
    notes: Vec<Note>,
    #[serde(default)]
    logs: Vec<InteractionLog>,
}

/// Free-form notes and the per-turn interaction log, persisted to `memory.json`.
#[derive(Debug)]
pub struct MemoryStore {
    file: JsonFile<MemoryData>,
}

impl MemoryStore {
    pub const FILE_NAME: &'static str = "memory.json";

    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            file: JsonFile::open(data_dir.join(Self::FILE_NAME))?,
        })
    }

    pub fn add_note(&mut self, content: &str) -> Result<(), StoreError> {
        let note = Note {
            timestamp: timestamp(),
            content: content.to_string(),
        };
        self.file.commit(|data| data.notes.push(note))
    }

    pub fn notes(&self) -> &[Note] {
        &self.file.data.notes
    }

    pub fn log_interaction(&mut self, user: &str, agent: &str) -> Result<(), StoreError> {
        let log = InteractionLog {
            timestamp: timestamp(),
            user: user.to_string(),
            agent: agent.to_string(),
        };
        self.file.commit(|data| data.logs.push(log))
    }

    pub fn logs(&self) -> &[InteractionLog] {
        &self.file.data.logs
    }
}
