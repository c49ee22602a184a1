use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::role::Role;

/// One conversation turn. Fields are read-only once the message exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    created: i64,
    content: String,
}

impl Message {
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: content.into(),
        }
    }

    /// Create a new system message with the current timestamp
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a new user message with the current timestamp
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new tool message holding the rendered outcome of a tool call
    pub fn tool<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Tool, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn created(&self) -> i64 {
        self.created
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}
