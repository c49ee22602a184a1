use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::models::message::Message;
use crate::models::role::Role;

/// Ordered, append-only conversation log, always seeded with one system message.
#[derive(Debug, Clone)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new<S: Into<String>>(system_prompt: S) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn append(&mut self, message: Message) {
        tracing::debug!(role = %message.role(), "appended message");
        self.messages.push(message);
    }

    /// A copy of every message, in insertion order
    pub fn all(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn system_message(&self) -> &Message {
        &self.messages[0]
    }

    /// Swap the seeding system message, keeping the rest of the conversation
    pub fn reseed<S: Into<String>>(&mut self, system_prompt: S) {
        self.messages[0] = Message::system(system_prompt);
    }

    /// Drop everything but the seeding system message
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }

    /// Write the conversation as JSON lines, one message per line
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create session file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        for message in &self.messages {
            serde_json::to_writer(&mut writer, message)?;
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Load a conversation written by [`MessageStore::persist`]
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open session file {}", path.display()))?;
        let mut messages = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let raw: serde_json::Value = serde_json::from_str(&line)?;
            if let Some(role) = raw.get("role").and_then(|r| r.as_str()) {
                role.parse::<Role>()?;
            }
            messages.push(serde_json::from_value::<Message>(raw)?);
        }
        match messages.first() {
            Some(first) if first.role() == Role::System => Ok(Self { messages }),
            Some(first) => Err(anyhow::anyhow!(
                "Session file must start with a system message, found {}",
                first.role()
            )),
            None => Err(anyhow::anyhow!("Session file {} is empty", path.display())),
        }
    }
}

/// Decides which part of the stored conversation is rendered for the model.
/// The store itself is never pruned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryPolicy {
    #[default]
    KeepAll,
    /// The system message plus the most recent `max_messages` others (at least one)
    Window { max_messages: usize },
}

impl HistoryPolicy {
    pub fn select<'a>(&self, messages: &'a [Message]) -> Vec<&'a Message> {
        match *self {
            HistoryPolicy::KeepAll => messages.iter().collect(),
            HistoryPolicy::Window { max_messages } => {
                let (head, rest) = match messages.split_first() {
                    Some(split) => split,
                    None => return Vec::new(),
                };
                // The newest message is always sent, it is what the model must answer
                let skip = rest.len().saturating_sub(max_messages.max(1));
                std::iter::once(head).chain(rest.iter().skip(skip)).collect()
            }
        }
    }
}
