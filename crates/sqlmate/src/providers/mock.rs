use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::models::tool::Tool;
use crate::models::wire::{ModelResponse, WireContent};
use crate::providers::base::{Provider, Usage};

/// A mock provider that replays pre-configured responses and records what it was sent
#[derive(Clone, Default)]
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<Result<ModelResponse, String>>>>,
    requests: Arc<Mutex<Vec<(Vec<WireContent>, Vec<Tool>)>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of successful responses
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    /// Create a mock provider whose turns may fail with the given message
    pub fn scripted(responses: Vec<Result<ModelResponse, String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::default(),
        }
    }

    /// Every (history, tools) pair received so far
    pub fn requests(&self) -> Vec<(Vec<WireContent>, Vec<Tool>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        contents: &[WireContent],
        tools: &[Tool],
    ) -> Result<(ModelResponse, Usage)> {
        self.requests
            .lock()
            .unwrap()
            .push((contents.to_vec(), tools.to_vec()));

        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok((response, Usage::default())),
            Some(Err(message)) => Err(anyhow!(message)),
            // Return an empty response once the script runs out
            None => Ok((ModelResponse::default(), Usage::default())),
        }
    }
}
