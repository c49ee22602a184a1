use anyhow::Result;
use std::path::PathBuf;

use crate::prompt::{InputType, Prompt};
use sqlmate::agent::Agent;

/// The interactive loop: reads questions, asks the agent and records the
/// conversation after every answer
pub struct Session<'a> {
    agent: Agent,
    prompt: Box<dyn Prompt + 'a>,
    session_file: PathBuf,
}

impl<'a> Session<'a> {
    pub fn new(agent: Agent, prompt: Box<dyn Prompt + 'a>, session_file: PathBuf) -> Self {
        Session {
            agent,
            prompt,
            session_file,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        println!("Recording to {}", self.session_file.display());
        self.prompt.ready();

        loop {
            let input = self.prompt.get_input()?;
            match input.input_type {
                InputType::Message => {
                    if let Some(question) = input.content {
                        self.ask(&question).await;
                    }
                }
                InputType::Clear => {
                    self.agent.clear_history();
                    self.persist();
                    println!("Conversation cleared.");
                }
                InputType::AskAgain | InputType::Help => continue,
                InputType::Exit => break,
            }
        }

        self.prompt.close();
        Ok(())
    }

    /// Answer a single question without entering the loop
    pub async fn headless(&mut self, question: &str) -> String {
        let answer = self.agent.process_query(question).await;
        self.persist();
        answer
    }

    async fn ask(&mut self, question: &str) {
        self.prompt.show_busy();
        let answer = self.agent.process_query(question).await;
        self.prompt.hide_busy();
        self.prompt.render(&answer);
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = self.agent.store().persist(&self.session_file) {
            tracing::warn!("failed to record session: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Input;
    use async_trait::async_trait;
    use sqlmate::agent::AgentConfig;
    use sqlmate::errors::{AgentError, AgentResult};
    use sqlmate::executor::ToolExecutor;
    use sqlmate::memory::MessageStore;
    use sqlmate::models::content::Content;
    use sqlmate::models::role::Role;
    use sqlmate::models::tool::{Tool, ToolCall};
    use sqlmate::models::wire::{ModelResponse, WireContent};
    use sqlmate::providers::base::{Provider, Usage};
    use sqlmate::systems::System;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        async fn complete(
            &self,
            contents: &[WireContent],
            _tools: &[Tool],
        ) -> anyhow::Result<(ModelResponse, Usage)> {
            let last = contents.last().map(|c| c.text.clone()).unwrap_or_default();
            Ok((ModelResponse::text(format!("echo: {}", last)), Usage::default()))
        }
    }

    struct NoTools;

    #[async_trait]
    impl System for NoTools {
        fn name(&self) -> &str {
            "none"
        }

        fn tools(&self) -> &[Tool] {
            &[]
        }

        async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
            Err(AgentError::ToolNotFound(tool_call.name))
        }
    }

    /// Replays typed lines and keeps what was rendered
    struct ScriptedPrompt {
        lines: VecDeque<&'static str>,
        rendered: Rc<RefCell<Vec<String>>>,
    }

    impl Prompt for ScriptedPrompt {
        fn render(&mut self, answer: &str) {
            self.rendered.borrow_mut().push(answer.to_string());
        }

        fn get_input(&mut self) -> Result<Input> {
            Ok(self
                .lines
                .pop_front()
                .map(Input::parse)
                .unwrap_or_else(|| Input::parse("exit")))
        }

        fn show_busy(&mut self) {}

        fn hide_busy(&self) {}

        fn close(&self) {}

        fn ready(&self) {}
    }

    fn agent() -> Agent {
        Agent::new(
            Arc::new(EchoProvider),
            ToolExecutor::new(Arc::new(NoTools)),
            AgentConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_loop_answers_clears_and_records() -> Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("test.jsonl");
        let rendered = Rc::new(RefCell::new(Vec::new()));
        let prompt = ScriptedPrompt {
            lines: VecDeque::from(vec!["first question", "/clear", "second question", "bye", "never asked"]),
            rendered: rendered.clone(),
        };

        let mut session = Session::new(agent(), Box::new(prompt), file.clone());
        session.start().await?;

        let rendered = rendered.borrow();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[0], "echo: first question");
        assert_eq!(rendered[1], "echo: second question");

        // The clear dropped the first exchange from the recording
        let store = MessageStore::load(&file)?;
        let roles: Vec<Role> = store.all().iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(store.all()[1].content(), "second question");
        Ok(())
    }

    #[tokio::test]
    async fn test_headless() -> Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("ask.jsonl");
        let prompt = ScriptedPrompt {
            lines: VecDeque::new(),
            rendered: Rc::new(RefCell::new(Vec::new())),
        };

        let mut session = Session::new(agent(), Box::new(prompt), file.clone());
        let answer = session.headless("how many tables?").await;
        assert_eq!(answer, "echo: how many tables?");
        assert_eq!(MessageStore::load(&file)?.len(), 3);
        Ok(())
    }
}
