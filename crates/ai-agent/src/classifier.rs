use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::category::Category;
use crate::conversation::ConversationState;
use crate::language_model::{LanguageModelClient, LanguageModelResponse};
use crate::options::ModelOptions;

const DEFAULT_CLASSIFIER_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub timeout_ms: u64,
    pub model_options: ModelOptions,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_CLASSIFIER_TIMEOUT_MS,
            model_options: ModelOptions::deterministic(None),
        }
    }
}

/// Outcome of one classification, kept for logging and turn reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Matched(Category),
    /// The model answered with a label outside the closed set.
    UnknownLabel(String),
    /// The call errored or timed out.
    Failed(String),
}

impl Classification {
    /// Falls back to the catch-all category on any failure.
    pub fn category(&self) -> Category {
        match self {
            Classification::Matched(category) => *category,
            _ => Category::All,
        }
    }
}

/// Maps free text onto one [`Category`] with a single cheap inference call.
///
/// Never fails: errors, timeouts and unknown labels all resolve to
/// [`Category::All`], which binds every registered tool.
pub struct IntentClassifier {
    model: Arc<dyn LanguageModelClient>,
    config: ClassifierConfig,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn LanguageModelClient>, config: ClassifierConfig) -> Self {
        Self { model, config }
    }

    pub async fn classify(&self, text: &str) -> Category {
        self.classify_detailed(text).await.category()
    }

    pub async fn classify_detailed(&self, text: &str) -> Classification {
        let classification = match self.request_label(text).await {
            Ok(response) => match parse_label(&response.message.content) {
                Some(category) => Classification::Matched(category),
                None => Classification::UnknownLabel(response.message.content),
            },
            Err(reason) => Classification::Failed(reason),
        };

        match &classification {
            Classification::Matched(category) => {
                info!(target: "ai_agent::classifier", %category, "classified input");
            }
            Classification::UnknownLabel(label) => {
                warn!(target: "ai_agent::classifier", label = %label, "unknown label; using ALL");
            }
            Classification::Failed(reason) => {
                warn!(target: "ai_agent::classifier", %reason, "classification failed; using ALL");
            }
        }
        classification
    }

    async fn request_label(&self, text: &str) -> Result<LanguageModelResponse, String> {
        let mut conversation = ConversationState::new(CLASSIFIER_SYSTEM_PROMPT);
        conversation
            .append_user(build_prompt(text))
            .map_err(|err| err.to_string())?;
        let deadline = Duration::from_millis(self.config.timeout_ms);
        let call = self
            .model
            .complete(conversation.snapshot(), &[], &self.config.model_options);
        match timeout(deadline, call).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(_) => Err(format!("timed out after {}ms", self.config.timeout_ms)),
        }
    }
}

pub fn build_prompt(query: &str) -> String {
    let categories = Category::ALL
        .iter()
        .map(|category| format!("- {}: {}", category.as_str(), category.description()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Classify the user query into exactly ONE of the following categories:\n\
         {categories}\n\n\
         Query: \"{query}\"\n\n\
         Return ONLY the category name in uppercase."
    )
}

/// Normalizes a raw model answer into a category label.
pub fn parse_label(raw: &str) -> Option<Category> {
    let label = raw
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.' | '*'))
        .trim()
        .to_uppercase();
    Category::parse(&label)
}

const CLASSIFIER_SYSTEM_PROMPT: &str = "You route requests for a personal assistant. \
Answer with a single category label and nothing else.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModel;

    #[test]
    fn parse_label_normalizes_case_and_decoration() {
        assert_eq!(parse_label("TODO"), Some(Category::Todo));
        assert_eq!(parse_label("  web_search\n"), Some(Category::WebSearch));
        assert_eq!(parse_label("\"SYSTEM\"."), Some(Category::System));
        assert_eq!(parse_label("`greeting`"), Some(Category::Greeting));
        assert_eq!(parse_label("The category is TODO"), None);
        assert_eq!(parse_label(""), None);
    }

    #[test]
    fn prompt_lists_every_category() {
        let prompt = build_prompt("open notepad");
        for category in Category::ALL {
            assert!(prompt.contains(category.as_str()));
        }
        assert!(prompt.contains("Query: \"open notepad\""));
    }

    #[tokio::test]
    async fn classifies_with_empty_schema_and_zero_temperature() {
        let model = ScriptedModel::with_texts(["todo"]);
        let classifier = IntentClassifier::new(model.clone(), ClassifierConfig::default());

        assert_eq!(
            classifier.classify("remind me to buy milk").await,
            Category::Todo
        );

        let requests = model.requests().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools.is_empty());
        assert_eq!(requests[0].options.temperature, 0.0);
        assert_eq!(requests[0].conversation.len(), 2);
    }

    #[tokio::test]
    async fn unknown_label_falls_back_to_all() {
        let model = ScriptedModel::with_texts(["WEATHER"]);
        let classifier = IntentClassifier::new(model, ClassifierConfig::default());
        assert_eq!(
            classifier.classify_detailed("is it raining").await,
            Classification::UnknownLabel("WEATHER".into())
        );
    }

    #[tokio::test]
    async fn inference_error_falls_back_to_all() {
        let model = ScriptedModel::failing("rate limited");
        let classifier = IntentClassifier::new(model, ClassifierConfig::default());
        assert_eq!(classifier.classify("hello").await, Category::All);
    }

    #[tokio::test]
    async fn timeout_falls_back_to_all() {
        let model = ScriptedModel::delayed(["TODO"], Duration::from_millis(200));
        let classifier = IntentClassifier::new(
            model,
            ClassifierConfig {
                timeout_ms: 10,
                ..ClassifierConfig::default()
            },
        );
        let outcome = classifier.classify_detailed("add milk").await;
        assert!(matches!(outcome, Classification::Failed(ref reason) if reason.contains("timed out")));
        assert_eq!(outcome.category(), Category::All);
    }
}
