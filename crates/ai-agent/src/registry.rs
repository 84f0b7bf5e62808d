use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::category::Category;
use crate::tool::{ToolDescription, ToolHandler};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool {0} is already registered")]
    DuplicateName(String),
    #[error("tools cannot be registered under category {0}")]
    UnassignableCategory(Category),
}

#[derive(Clone)]
pub struct ToolRecord {
    pub category: Category,
    pub description: ToolDescription,
    pub handler: Arc<dyn ToolHandler>,
}

/// Insertion-ordered tool registry partitioned by [`Category`].
///
/// The order tools are registered in is the order they are presented to the
/// model, so the tool schema stays byte-stable across turns.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: IndexMap<String, ToolRecord>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        category: Category,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        if !category.accepts_tools() {
            return Err(RegistryError::UnassignableCategory(category));
        }
        let description = handler.description().clone();
        if self.tools.contains_key(&description.name) {
            return Err(RegistryError::DuplicateName(description.name));
        }
        self.tools.insert(
            description.name.clone(),
            ToolRecord {
                category,
                description,
                handler,
            },
        );
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<&ToolRecord> {
        self.tools.get(name)
    }

    pub fn tools_for_category(&self, category: Category) -> Vec<&ToolRecord> {
        if category.binds_no_tools() {
            return Vec::new();
        }
        self.tools
            .values()
            .filter(|record| category.is_catch_all() || record.category == category)
            .collect()
    }

    /// Tool schema bound to the model for a turn classified as `category`.
    pub fn schema_for(&self, category: Category) -> Vec<ToolDescription> {
        self.tools_for_category(category)
            .into_iter()
            .map(|record| record.description.clone())
            .collect()
    }

    pub fn descriptions(&self) -> Vec<(Category, ToolDescription)> {
        self.tools
            .values()
            .map(|record| (record.category, record.description.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
