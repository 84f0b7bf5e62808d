use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::conversation::{AssistantMessage, Message};
use crate::language_model::{LanguageModelClient, LanguageModelResponse};
use crate::options::ModelOptions;
use crate::tool::ToolDescription;

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub conversation: Vec<Message>,
    pub tools: Vec<ToolDescription>,
    pub options: ModelOptions,
}

/// Replays canned responses in order and records every request it receives.
pub(crate) struct ScriptedModel {
    responses: Mutex<VecDeque<Result<LanguageModelResponse, String>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    fail_all: Option<String>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<LanguageModelResponse, String>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            fail_all: None,
            delay: None,
        })
    }

    pub fn with_texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> Arc<Self> {
        Self::new(
            texts
                .into_iter()
                .map(|text| Ok(LanguageModelResponse::new(AssistantMessage::text(text))))
                .collect(),
        )
    }

    pub fn delayed<'a>(texts: impl IntoIterator<Item = &'a str>, delay: Duration) -> Arc<Self> {
        let responses = texts
            .into_iter()
            .map(|text| Ok(LanguageModelResponse::new(AssistantMessage::text(text))))
            .collect::<VecDeque<_>>();
        Arc::new(Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            fail_all: None,
            delay: Some(delay),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            fail_all: Some(reason.to_string()),
            delay: None,
        })
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LanguageModelClient for ScriptedModel {
    async fn complete(
        &self,
        conversation: &[Message],
        tools: &[ToolDescription],
        options: &ModelOptions,
    ) -> anyhow::Result<LanguageModelResponse> {
        self.requests.lock().await.push(RecordedRequest {
            conversation: conversation.to_vec(),
            tools: tools.to_vec(),
            options: options.clone(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.fail_all {
            return Err(anyhow!(reason.clone()));
        }
        match self.responses.lock().await.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(reason)) => Err(anyhow!(reason)),
            None => Err(anyhow!("scripted model ran out of responses")),
        }
    }
}
