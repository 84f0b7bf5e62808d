use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::category::Category;
use crate::classifier::IntentClassifier;
use crate::conversation::{AssistantMessage, ConversationError, ConversationState, ToolCall};
use crate::language_model::LanguageModelClient;
use crate::options::ModelOptions;
use crate::registry::ToolRegistry;
use crate::tool::ToolArguments;
use crate::usage::{UsageRecord, UsageTracker};

pub const TOOL_LIMIT_MESSAGE: &str = "Turn aborted: tool-call limit exceeded.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub system_prompt: String,
    /// Dispatching rounds allowed per turn before the turn is aborted.
    pub max_tool_rounds: usize,
    pub model_options: ModelOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.trim().to_string(),
            max_tool_rounds: crate::DEFAULT_MAX_TOOL_ROUNDS,
            model_options: ModelOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    Classifying,
    Inferring,
    Dispatching,
    Responding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentEvent {
    Classified {
        category: Category,
    },
    ModelResponse {
        content: String,
        tool_calls: usize,
    },
    ToolCall {
        id: String,
        name: String,
        args: ToolArguments,
    },
    ToolResult {
        id: String,
        name: String,
        output: String,
        failed: bool,
    },
    ToolLimitReached {
        rounds: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub final_answer: String,
    pub category: Category,
    pub tool_rounds: usize,
    pub usage: Option<UsageRecord>,
    pub events: Vec<AgentEvent>,
    /// Set when the turn was cut off by the tool-round limit.
    pub halted: bool,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("inference failed: {0:#}")]
    Inference(#[source] anyhow::Error),
    #[error("conversation rejected message: {0}")]
    Conversation(#[from] ConversationError),
}

/// Drives one user turn at a time: classify, bind the category's tools, then
/// alternate inference and sequential tool dispatch until the model answers
/// without requesting calls.
pub struct AgentOrchestrator {
    model: Arc<dyn LanguageModelClient>,
    classifier: IntentClassifier,
    registry: Arc<ToolRegistry>,
    conversation: ConversationState,
    usage: UsageTracker,
    config: AgentConfig,
    phase: TurnPhase,
}

impl AgentOrchestrator {
    pub fn new(
        model: Arc<dyn LanguageModelClient>,
        classifier: IntentClassifier,
        registry: Arc<ToolRegistry>,
        conversation: ConversationState,
        config: AgentConfig,
    ) -> Self {
        Self {
            model,
            classifier,
            registry,
            conversation,
            usage: UsageTracker::new(),
            config,
            phase: TurnPhase::Idle,
        }
    }

    /// Builds an orchestrator whose conversation starts with the configured
    /// system prompt.
    pub fn with_default_conversation(
        model: Arc<dyn LanguageModelClient>,
        classifier: IntentClassifier,
        registry: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        let conversation = ConversationState::new(config.system_prompt.clone());
        Self::new(model, classifier, registry, conversation, config)
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub async fn run_turn(&mut self, input: &str) -> Result<TurnOutcome, AgentError> {
        self.usage.begin_turn();
        let result = self.drive_turn(input).await;
        let usage = self.usage.end_turn();
        self.phase = TurnPhase::Idle;
        result.map(|mut outcome| {
            outcome.usage = usage;
            outcome
        })
    }

    async fn drive_turn(&mut self, input: &str) -> Result<TurnOutcome, AgentError> {
        let mut events = Vec::new();

        self.phase = TurnPhase::Classifying;
        self.conversation.append_user(input)?;
        let category = self.classifier.classify(input).await;
        events.push(AgentEvent::Classified { category });

        let schema = self.registry.schema_for(category);
        debug!(
            target: "ai_agent::orchestrator",
            %category,
            tools = schema.len(),
            "bound tool schema"
        );

        let mut tool_rounds = 0usize;
        loop {
            self.phase = TurnPhase::Inferring;
            let response = self
                .model
                .complete(
                    self.conversation.snapshot(),
                    &schema,
                    &self.config.model_options,
                )
                .await
                .map_err(AgentError::Inference)?;
            self.usage.record_response(&response.usage);

            let mut message = response.message;
            events.push(AgentEvent::ModelResponse {
                content: message.content.clone(),
                tool_calls: message.tool_calls.len(),
            });

            if !message.has_tool_calls() {
                self.phase = TurnPhase::Responding;
                let answer = message.content.clone();
                self.conversation.append_assistant(message)?;
                return Ok(TurnOutcome {
                    final_answer: answer,
                    category,
                    tool_rounds,
                    usage: None,
                    events,
                    halted: false,
                });
            }

            let repeated = make_call_ids_unique(&mut message.tool_calls);
            let calls = message.tool_calls.clone();
            self.conversation.append_assistant(message)?;

            if tool_rounds >= self.config.max_tool_rounds {
                warn!(
                    target: "ai_agent::orchestrator",
                    rounds = tool_rounds,
                    "tool-call limit exceeded; aborting turn"
                );
                for call in &calls {
                    self.conversation.append_tool_result(
                        &call.id,
                        format!("Error: {} was not executed (tool-call limit exceeded).", call.name),
                    )?;
                }
                self.conversation
                    .append_assistant(AssistantMessage::text(TOOL_LIMIT_MESSAGE))?;
                events.push(AgentEvent::ToolLimitReached {
                    rounds: tool_rounds,
                });
                self.phase = TurnPhase::Responding;
                return Ok(TurnOutcome {
                    final_answer: TOOL_LIMIT_MESSAGE.to_string(),
                    category,
                    tool_rounds,
                    usage: None,
                    events,
                    halted: true,
                });
            }

            self.phase = TurnPhase::Dispatching;
            tool_rounds += 1;
            for call in calls {
                let repeat_of = repeated.get(&call.id).cloned();
                self.dispatch(call, repeat_of, &mut events).await?;
            }
        }
    }

    async fn dispatch(
        &mut self,
        call: ToolCall,
        repeat_of: Option<String>,
        events: &mut Vec<AgentEvent>,
    ) -> Result<(), AgentError> {
        info!(target: "ai_agent::orchestrator", tool = %call.name, id = %call.id, "dispatching tool call");
        events.push(AgentEvent::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            args: call.arguments.clone(),
        });

        let (output, failed) = if let Some(original) = repeat_of {
            warn!(target: "ai_agent::orchestrator", tool = %call.name, id = %original, "model repeated a tool call id");
            (
                format!(
                    "Error: {} was not executed (repeated tool call id {original}).",
                    call.name
                ),
                true,
            )
        } else if let Some(reason) = &call.argument_error {
            (
                format!("Error: invalid arguments for {}: {reason}", call.name),
                true,
            )
        } else {
            match self.registry.resolve(&call.name) {
                Some(record) => match record.handler.invoke(call.arguments).await {
                    Ok(text) => (text, false),
                    Err(err) => {
                        warn!(target: "ai_agent::orchestrator", tool = %call.name, error = %err, "tool failed");
                        (format!("Error: {err}"), true)
                    }
                },
                None => {
                    warn!(target: "ai_agent::orchestrator", tool = %call.name, "model requested unknown tool");
                    (format!("Tool {} not found.", call.name), true)
                }
            }
        };

        self.conversation.append_tool_result(&call.id, output.clone())?;
        events.push(AgentEvent::ToolResult {
            id: call.id,
            name: call.name,
            output,
            failed,
        });
        Ok(())
    }
}

/// Renames calls whose id already appeared earlier in the same message so every
/// call can be answered. Returns the new ids mapped to the id they repeated.
fn make_call_ids_unique(calls: &mut [ToolCall]) -> HashMap<String, String> {
    let mut seen: HashSet<String> = calls.iter().map(|call| call.id.clone()).collect();
    let mut first = HashSet::new();
    let mut repeated = HashMap::new();
    for call in calls.iter_mut() {
        if first.insert(call.id.clone()) {
            continue;
        }
        let original = call.id.clone();
        let mut suffix = 2;
        let mut candidate = format!("{original}-{suffix}");
        while seen.contains(&candidate) {
            suffix += 1;
            candidate = format!("{original}-{suffix}");
        }
        seen.insert(candidate.clone());
        call.id = candidate.clone();
        repeated.insert(candidate, original);
    }
    repeated
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"
You are Concierge, a helpful personal agentic assistant.
You can search the web, manage todos, and provide system info.
Be concise, friendly, and proactive.
When a tool reports an error, tell the user plainly what went wrong.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierConfig;
    use crate::conversation::Role;
    use crate::language_model::{LanguageModelResponse, LanguageModelUsage};
    use crate::test_support::ScriptedModel;
    use crate::tool::{FnTool, ToolDescription, ToolError, ToolHandler};
    use serde_json::json;

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::new(id, name, args.as_object().cloned().unwrap_or_default())
    }

    fn calls(content: &str, calls: Vec<ToolCall>) -> Result<LanguageModelResponse, String> {
        Ok(LanguageModelResponse::new(AssistantMessage::with_calls(
            content, calls,
        )))
    }

    fn text(content: &str) -> Result<LanguageModelResponse, String> {
        Ok(LanguageModelResponse::new(AssistantMessage::text(content)))
    }

    fn echo_tool(name: &str) -> Arc<dyn ToolHandler> {
        let label = name.to_string();
        Arc::new(FnTool::new(
            ToolDescription::new(name, format!("{name} tool"), json!({"type": "object"})),
            move |_| Ok(format!("{label} done")),
        ))
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Category::Todo, echo_tool("add_todo")).unwrap();
        registry.register(Category::Todo, echo_tool("list_todos")).unwrap();
        registry.register(Category::System, echo_tool("get_time")).unwrap();
        registry
            .register(
                Category::System,
                Arc::new(FnTool::new(
                    ToolDescription::new("explode", "always fails", json!({})),
                    |_| Err(ToolError::Invocation("disk on fire".into())),
                )),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn orchestrator(
        classifier_label: &str,
        model: Arc<ScriptedModel>,
        config: AgentConfig,
    ) -> AgentOrchestrator {
        let classifier = IntentClassifier::new(
            ScriptedModel::with_texts([classifier_label]),
            ClassifierConfig::default(),
        );
        AgentOrchestrator::with_default_conversation(model, classifier, registry(), config)
    }

    #[tokio::test]
    async fn final_answer_without_tools_ends_turn() {
        let model = ScriptedModel::new(vec![text("Hi there!")]);
        let mut agent = orchestrator("GREETING", model.clone(), AgentConfig::default());

        let outcome = agent.run_turn("hello").await.unwrap();
        assert_eq!(outcome.final_answer, "Hi there!");
        assert_eq!(outcome.category, Category::Greeting);
        assert_eq!(outcome.tool_rounds, 0);
        assert!(!outcome.halted);
        assert_eq!(agent.phase(), TurnPhase::Idle);

        let requests = model.requests().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools.is_empty(), "greeting binds no tools");
    }

    #[tokio::test]
    async fn tool_results_follow_call_order_before_next_inference() {
        let model = ScriptedModel::new(vec![
            calls(
                "",
                vec![
                    call("c1", "add_todo", json!({"task": "a"})),
                    call("c2", "missing_tool", json!({})),
                    call("c3", "list_todos", json!({})),
                ],
            ),
            text("All set."),
        ]);
        let mut agent = orchestrator("TODO", model.clone(), AgentConfig::default());
        let outcome = agent.run_turn("add a and list").await.unwrap();
        assert_eq!(outcome.final_answer, "All set.");
        assert_eq!(outcome.tool_rounds, 1);

        let requests = model.requests().await;
        assert_eq!(requests.len(), 2);
        let second = &requests[1].conversation;
        let results: Vec<_> = second
            .iter()
            .filter(|m| m.role == Role::ToolResult)
            .map(|m| (m.tool_call_id.clone().unwrap(), m.content.clone()))
            .collect();
        assert_eq!(
            results,
            vec![
                ("c1".to_string(), "add_todo done".to_string()),
                ("c2".to_string(), "Tool missing_tool not found.".to_string()),
                ("c3".to_string(), "list_todos done".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn category_binding_is_sticky_for_the_whole_turn() {
        let model = ScriptedModel::new(vec![
            calls("", vec![call("c1", "add_todo", json!({}))]),
            calls("", vec![call("c2", "list_todos", json!({}))]),
            text("done"),
        ]);
        let mut agent = orchestrator("TODO", model.clone(), AgentConfig::default());
        agent.run_turn("todo things").await.unwrap();

        let requests = model.requests().await;
        assert_eq!(requests.len(), 3);
        for request in &requests {
            let names: Vec<_> = request.tools.iter().map(|t| t.name.as_str()).collect();
            assert_eq!(names, vec!["add_todo", "list_todos"]);
        }
    }

    #[tokio::test]
    async fn failing_tool_is_reported_to_the_model() {
        let model = ScriptedModel::new(vec![
            calls("", vec![call("c1", "explode", json!({}))]),
            text("Sorry, that failed."),
        ]);
        let mut agent = orchestrator("SYSTEM", model.clone(), AgentConfig::default());
        let outcome = agent.run_turn("do something risky").await.unwrap();
        assert_eq!(outcome.final_answer, "Sorry, that failed.");
        assert!(outcome.events.iter().any(|event| matches!(
            event,
            AgentEvent::ToolResult { failed: true, output, .. }
                if output == "Error: tool invocation failed: disk on fire"
        )));

        let requests = model.requests().await;
        let last = requests[1].conversation.last().unwrap();
        assert_eq!(last.role, Role::ToolResult);
        assert!(last.content.starts_with("Error:"));
    }

    #[tokio::test]
    async fn tool_round_limit_aborts_turn_with_valid_history() {
        let model = ScriptedModel::new(vec![
            calls("", vec![call("c1", "get_time", json!({}))]),
            calls("", vec![call("c2", "get_time", json!({}))]),
            calls("", vec![call("c3", "get_time", json!({}))]),
        ]);
        let config = AgentConfig {
            max_tool_rounds: 2,
            ..AgentConfig::default()
        };
        let mut agent = orchestrator("SYSTEM", model.clone(), config);
        let outcome = agent.run_turn("loop forever").await.unwrap();

        assert!(outcome.halted);
        assert_eq!(outcome.final_answer, TOOL_LIMIT_MESSAGE);
        assert_eq!(outcome.tool_rounds, 2);
        assert_eq!(agent.conversation().pending_calls().count(), 0);

        let snapshot = agent.conversation().snapshot();
        let unexecuted = &snapshot[snapshot.len() - 2];
        assert_eq!(unexecuted.tool_call_id.as_deref(), Some("c3"));
        assert!(unexecuted.content.contains("not executed"));
        assert_eq!(snapshot.last().unwrap().content, TOOL_LIMIT_MESSAGE);
    }

    #[tokio::test]
    async fn inference_failure_propagates_and_session_survives() {
        let model = ScriptedModel::new(vec![Err("503 upstream".into()), text("Back online.")]);
        let mut agent = orchestrator("GREETING", model, AgentConfig::default());

        let err = agent.run_turn("hello?").await.unwrap_err();
        assert!(matches!(err, AgentError::Inference(_)));
        assert!(err.to_string().contains("503 upstream"));
        assert_eq!(agent.phase(), TurnPhase::Idle);

        // The classifier script is spent, so the second turn falls back to ALL.
        let outcome = agent.run_turn("hello again").await.unwrap();
        assert_eq!(outcome.final_answer, "Back online.");
        assert_eq!(outcome.category, Category::All);
    }

    #[tokio::test]
    async fn usage_is_accumulated_per_turn_and_session() {
        let model = ScriptedModel::new(vec![
            Ok(LanguageModelResponse::new(AssistantMessage::with_calls(
                "",
                vec![call("c1", "get_time", json!({}))],
            ))
            .with_usage(LanguageModelUsage::new(100, 10, 110))),
            Ok(LanguageModelResponse::new(AssistantMessage::text("It is noon."))
                .with_usage(LanguageModelUsage::new(120, 5, 125))),
            text("No usage here."),
        ]);
        let classifier = IntentClassifier::new(
            ScriptedModel::with_texts(["SYSTEM", "GREETING"]),
            ClassifierConfig::default(),
        );
        let mut agent = AgentOrchestrator::with_default_conversation(
            model,
            classifier,
            registry(),
            AgentConfig::default(),
        );

        let first = agent.run_turn("what time is it").await.unwrap();
        assert_eq!(first.usage, Some(UsageRecord::new(220, 15, 235)));

        let second = agent.run_turn("thanks").await.unwrap();
        assert_eq!(second.usage, None);
        assert_eq!(agent.usage().session_totals(), UsageRecord::new(220, 15, 235));
        assert_eq!(agent.usage().last_turn_totals(), None);
    }

    fn tool_results(request: &crate::test_support::RecordedRequest) -> Vec<(String, String)> {
        request
            .conversation
            .iter()
            .filter(|m| m.role == Role::ToolResult)
            .map(|m| (m.tool_call_id.clone().unwrap(), m.content.clone()))
            .collect()
    }

    #[tokio::test]
    async fn undecodable_arguments_become_an_error_result() {
        let model = ScriptedModel::new(vec![
            calls(
                "",
                vec![
                    ToolCall::malformed("c1", "add_todo", "not valid JSON (EOF while parsing)"),
                    call("c2", "list_todos", json!({})),
                ],
            ),
            text("I could not read that task, here is your list."),
        ]);
        let mut agent = orchestrator("TODO", model.clone(), AgentConfig::default());
        let outcome = agent.run_turn("add milk").await.unwrap();
        assert_eq!(
            outcome.final_answer,
            "I could not read that task, here is your list."
        );
        assert!(outcome.events.contains(&AgentEvent::ToolResult {
            id: "c1".into(),
            name: "add_todo".into(),
            output: "Error: invalid arguments for add_todo: not valid JSON (EOF while parsing)"
                .into(),
            failed: true,
        }));

        let requests = model.requests().await;
        assert_eq!(
            tool_results(&requests[1]),
            vec![
                (
                    "c1".to_string(),
                    "Error: invalid arguments for add_todo: not valid JSON (EOF while parsing)"
                        .to_string()
                ),
                ("c2".to_string(), "list_todos done".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn repeated_call_ids_are_answered_not_fatal() {
        let model = ScriptedModel::new(vec![
            calls(
                "",
                vec![
                    call("x", "add_todo", json!({"task": "a"})),
                    call("x", "add_todo", json!({"task": "b"})),
                ],
            ),
            text("Added a."),
        ]);
        let mut agent = orchestrator("TODO", model.clone(), AgentConfig::default());
        let outcome = agent.run_turn("add a and b").await.unwrap();
        assert_eq!(outcome.final_answer, "Added a.");

        let requests = model.requests().await;
        assert_eq!(
            tool_results(&requests[1]),
            vec![
                ("x".to_string(), "add_todo done".to_string()),
                (
                    "x-2".to_string(),
                    "Error: add_todo was not executed (repeated tool call id x).".to_string()
                ),
            ]
        );
        assert_eq!(agent.conversation().pending_calls().count(), 0);
    }

    #[test]
    fn renamed_ids_skip_existing_ones() {
        let mut batch = vec![
            call("x", "a", json!({})),
            call("x", "b", json!({})),
            call("x-2", "c", json!({})),
        ];
        let repeated = make_call_ids_unique(&mut batch);
        let ids: Vec<_> = batch.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "x-3", "x-2"]);
        assert_eq!(repeated.get("x-3").map(String::as_str), Some("x"));
        assert_eq!(repeated.len(), 1);
    }

    #[tokio::test]
    async fn outcome_survives_a_json_report() {
        let model = ScriptedModel::new(vec![Ok(LanguageModelResponse::new(
            AssistantMessage::text("Hi!"),
        )
        .with_usage(LanguageModelUsage::new(10, 2, 12)))]);
        let mut agent = orchestrator("GREETING", model, AgentConfig::default());
        let outcome = agent.run_turn("hello").await.unwrap();

        let report = serde_json::to_value(&outcome).unwrap();
        assert_eq!(report["usage"]["total_units"], 12);
        let restored: TurnOutcome = serde_json::from_value(report).unwrap();
        assert_eq!(restored.usage, Some(UsageRecord::new(10, 2, 12)));
        assert_eq!(restored.category, Category::Greeting);
    }
}
