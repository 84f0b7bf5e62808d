use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    /// Model identifier; `None` lets the client use its configured default.
    #[serde(default)]
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.0,
            max_tokens: Some(1024),
        }
    }
}

impl ModelOptions {
    /// Deterministic options for single-label outputs.
    pub fn deterministic(model: Option<String>) -> Self {
        Self {
            model,
            temperature: 0.0,
            max_tokens: Some(16),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}
