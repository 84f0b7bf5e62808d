use std::sync::{Arc, Mutex};

use ai_agent::{
    AgentConfig, AgentOrchestrator, Category, ClassifierConfig, ConversationState,
    IntentClassifier, LanguageModelClient, RegistryError, ToolDescription, ToolHandler,
    ToolRegistry, TurnOutcome, UsageRecord, UsageTracker,
};
use anyhow::Result;
use tracing::warn;

use crate::skills::{register_builtin_skills, SharedOrganizer};
use crate::store::MemoryStore;

pub type SharedMemory = Arc<Mutex<MemoryStore>>;

pub struct AgentRuntime {
    orchestrator: AgentOrchestrator,
    memory: Option<SharedMemory>,
}

impl AgentRuntime {
    pub fn builder(model: Arc<dyn LanguageModelClient>) -> AgentRuntimeBuilder {
        AgentRuntimeBuilder::new(model)
    }

    /// Runs one user turn to completion and appends it to the interaction log.
    pub async fn run(&mut self, input: &str) -> Result<AgentRuntimeResult> {
        let outcome = self.orchestrator.run_turn(input).await?;
        self.log_interaction(input, &outcome.final_answer);
        Ok(AgentRuntimeResult {
            session_usage: self.orchestrator.usage().session_totals(),
            turn: outcome,
        })
    }

    fn log_interaction(&self, input: &str, answer: &str) {
        let Some(memory) = &self.memory else {
            return;
        };
        let result = match memory.lock() {
            Ok(mut guard) => guard.log_interaction(input, answer).map_err(|err| err.to_string()),
            Err(_) => Err("memory store lock poisoned".to_string()),
        };
        if let Err(reason) = result {
            warn!(target: "agent_core::runtime", %reason, "failed to record interaction");
        }
    }

    pub fn tool_descriptions(&self) -> Vec<(Category, ToolDescription)> {
        self.orchestrator.registry().descriptions()
    }

    pub fn usage(&self) -> &UsageTracker {
        self.orchestrator.usage()
    }

    pub fn conversation(&self) -> &ConversationState {
        self.orchestrator.conversation()
    }
}

pub struct AgentRuntimeBuilder {
    model: Arc<dyn LanguageModelClient>,
    classifier_model: Option<Arc<dyn LanguageModelClient>>,
    config: AgentConfig,
    classifier_config: ClassifierConfig,
    tools: Vec<(Category, Arc<dyn ToolHandler>)>,
    organizer: Option<SharedOrganizer>,
    memory: Option<SharedMemory>,
}

impl AgentRuntimeBuilder {
    fn new(model: Arc<dyn LanguageModelClient>) -> Self {
        Self {
            model,
            classifier_model: None,
            config: AgentConfig::default(),
            classifier_config: ClassifierConfig::default(),
            tools: Vec::new(),
            organizer: None,
            memory: None,
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Model used for intent classification. Defaults to the reasoning model.
    pub fn with_classifier_model(mut self, model: Arc<dyn LanguageModelClient>) -> Self {
        self.classifier_model = Some(model);
        self
    }

    pub fn with_classifier_config(mut self, config: ClassifierConfig) -> Self {
        self.classifier_config = config;
        self
    }

    /// Enables the built-in todo/journal skills backed by `organizer`.
    pub fn with_organizer(mut self, organizer: SharedOrganizer) -> Self {
        self.organizer = Some(organizer);
        self
    }

    /// Every completed turn is appended to `memory`'s interaction log.
    pub fn with_memory(mut self, memory: SharedMemory) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn register_tool(mut self, category: Category, tool: Arc<dyn ToolHandler>) -> Self {
        self.tools.push((category, tool));
        self
    }

    pub fn build(self) -> Result<AgentRuntime, RegistryError> {
        let mut registry = ToolRegistry::new();
        if let Some(organizer) = self.organizer {
            register_builtin_skills(&mut registry, organizer)?;
        }
        for (category, tool) in self.tools {
            registry.register(category, tool)?;
        }

        let classifier_model = self.classifier_model.unwrap_or_else(|| self.model.clone());
        let classifier = IntentClassifier::new(classifier_model, self.classifier_config);
        let orchestrator = AgentOrchestrator::with_default_conversation(
            self.model,
            classifier,
            Arc::new(registry),
            self.config,
        );
        Ok(AgentRuntime {
            orchestrator,
            memory: self.memory,
        })
    }
}

#[derive(Debug)]
pub struct AgentRuntimeResult {
    pub turn: TurnOutcome,
    pub session_usage: UsageRecord,
}
