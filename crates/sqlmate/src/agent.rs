use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use strum_macros::Display;
use tracing::Instrument;
use uuid::Uuid;

use crate::detector::{Detection, StructuredDetector, TokenDetector, ToolCallDetector};
use crate::executor::ToolExecutor;
use crate::memory::{HistoryPolicy, MessageStore};
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::prompt_template::{follow_up_prompt, system_prompt};
use crate::providers::base::Provider;
use crate::providers::utils::messages_to_wire_contents;

/// Returned when the model produced neither text nor a usable tool call
pub const EMPTY_RESPONSE_FALLBACK: &str =
    "I could not produce an answer for that question. Please try rephrasing it.";

/// How tool requests are recognized in model output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentMode {
    /// Function calls returned by the model API
    #[default]
    Structured,
    /// Command tokens written in the response text
    Token,
}

impl AgentMode {
    pub fn default_max_tool_rounds(&self) -> usize {
        match self {
            AgentMode::Structured => 8,
            AgentMode::Token => 1,
        }
    }

    fn detector(&self) -> Box<dyn ToolCallDetector> {
        match self {
            AgentMode::Structured => Box::new(StructuredDetector),
            AgentMode::Token => Box::new(TokenDetector),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub mode: AgentMode,
    /// Model turns that may request tools before a response is taken as final
    pub max_tool_rounds: usize,
    pub history: HistoryPolicy,
}

impl AgentConfig {
    pub fn new(mode: AgentMode) -> Self {
        Self {
            mode,
            max_tool_rounds: mode.default_max_tool_rounds(),
            history: HistoryPolicy::default(),
        }
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    pub fn with_history(mut self, history: HistoryPolicy) -> Self {
        self.history = history;
        self
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new(AgentMode::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum AgentState {
    Idle,
    AwaitingModel,
    ToolRequested,
    AwaitingFollowup,
    Done,
}

/// Agent drives one conversation: it keeps the history, asks the model for turns,
/// runs the tools the model requests and returns the final answer.
pub struct Agent {
    id: Uuid,
    provider: Arc<dyn Provider>,
    executor: ToolExecutor,
    detector: Box<dyn ToolCallDetector>,
    store: MessageStore,
    config: AgentConfig,
    state: AgentState,
}

impl Agent {
    /// Create an Agent whose conversation is seeded with the persona for `config.mode`
    pub fn new(
        provider: Arc<dyn Provider>,
        executor: ToolExecutor,
        config: AgentConfig,
    ) -> Result<Self> {
        let persona = system_prompt(config.mode, executor.tools())?;
        Ok(Self::build(
            provider,
            executor,
            config,
            MessageStore::new(persona),
        ))
    }

    /// Continue a previously recorded conversation. The recorded persona is
    /// replaced when it no longer matches the configured mode and tool catalog.
    pub fn resume(
        provider: Arc<dyn Provider>,
        executor: ToolExecutor,
        config: AgentConfig,
        mut store: MessageStore,
    ) -> Result<Self> {
        let persona = system_prompt(config.mode, executor.tools())?;
        if store.system_message().content() != persona {
            tracing::warn!(
                mode = %config.mode,
                "recorded persona does not match the current configuration, replacing it"
            );
            store.reseed(persona);
        }
        Ok(Self::build(provider, executor, config, store))
    }

    fn build(
        provider: Arc<dyn Provider>,
        executor: ToolExecutor,
        config: AgentConfig,
        store: MessageStore,
    ) -> Self {
        let id = Uuid::new_v4();
        tracing::info!(
            session = %id,
            mode = %config.mode,
            tools = executor.tools().len(),
            "agent ready"
        );
        Self {
            id,
            provider,
            detector: config.mode.detector(),
            executor,
            store,
            config,
            state: AgentState::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// A snapshot of the conversation so far
    pub fn messages(&self) -> Vec<Message> {
        self.store.all()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Forget everything but the persona
    pub fn clear_history(&mut self) {
        self.store.reset();
        tracing::info!(session = %self.id, "history cleared");
    }

    /// Answer one question. Never fails: every error is folded into the returned
    /// text, and exactly one assistant message is recorded per call.
    pub async fn process_query(&mut self, query: &str) -> String {
        let span = tracing::info_span!("process_query", session = %self.id);
        self.answer(query).instrument(span).await
    }

    async fn answer(&mut self, query: &str) -> String {
        self.store.append(Message::user(query));

        let answer = match self.run_cycle(query).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!("query failed: {:#}", e);
                format!("❌ Error: {}", e)
            }
        };

        self.store.append(Message::assistant(answer.clone()));
        self.transition(AgentState::Done);
        self.transition(AgentState::Idle);
        answer
    }

    async fn run_cycle(&mut self, query: &str) -> Result<String> {
        let catalog: Vec<Tool> = self.executor.tools().to_vec();
        let offered: &[Tool] = match self.config.mode {
            AgentMode::Structured => catalog.as_slice(),
            AgentMode::Token => &[],
        };

        // Identical calls within one question are answered from here
        let mut results: HashMap<String, String> = HashMap::new();
        let mut rounds = 0;

        self.transition(AgentState::AwaitingModel);
        loop {
            let contents =
                messages_to_wire_contents(self.config.history.select(self.store.as_slice()));
            let (response, usage) = self.provider.complete(&contents, offered).await?;
            tracing::debug!(total_tokens = ?usage.total_tokens, "model turn");

            let (text, calls) = match self.detector.detect(&response) {
                Detection::Answer(text) => return Ok(final_text(text)),
                Detection::ToolCalls { text, calls } => (text, calls),
            };

            if catalog.is_empty() {
                tracing::warn!("model asked for tools but none are available");
                return Ok(final_text(text));
            }
            if rounds >= self.config.max_tool_rounds {
                tracing::warn!(rounds, "tool round limit reached, returning response as is");
                return Ok(final_text(text));
            }
            rounds += 1;

            self.transition(AgentState::ToolRequested);
            for call in calls {
                let key = call.dedup_key();
                let payload = match results.get(&key) {
                    Some(previous) => {
                        tracing::info!(tool = %call.name, "reusing result of identical call");
                        previous.clone()
                    }
                    None => {
                        let result = self.executor.execute(&call).await;
                        results.insert(key, result.payload.clone());
                        result.payload
                    }
                };
                self.store.append(Message::tool(payload));
                self.store
                    .append(Message::user(follow_up_prompt(&call.name, query)?));
            }
            self.transition(AgentState::AwaitingFollowup);
        }
    }

    fn transition(&mut self, next: AgentState) {
        tracing::trace!(from = %self.state, to = %next, "state change");
        self.state = next;
    }
}

fn final_text(text: String) -> String {
    if text.trim().is_empty() {
        tracing::warn!("model returned an empty response");
        EMPTY_RESPONSE_FALLBACK.to_string()
    } else {
        text
    }
}
