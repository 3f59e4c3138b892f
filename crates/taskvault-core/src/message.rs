//! Message types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::Part;

/// A message exchanged while working on a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message identifier; the store generates one per row when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Who sent the message
    pub role: Role,

    /// Content parts of the message
    pub parts: Vec<Part>,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Back-reference to the owning context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,

    /// Back-reference to the owning task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl Message {
    /// Create a user message with a single text part
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            role: Role::User,
            parts: vec![Part::text(text)],
            metadata: HashMap::new(),
            context_id: None,
            task_id: None,
        }
    }

    /// Create an agent message with a single text part
    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            role: Role::Agent,
            parts: vec![Part::text(text)],
            metadata: HashMap::new(),
            context_id: None,
            task_id: None,
        }
    }

    /// Set the message id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a part
    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Set a metadata entry
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message from a user (or a client acting on behalf of one)
    User,

    /// Message from an agent
    Agent,
}

impl Role {
    /// The persisted wire string for this role
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
        }
    }

    /// Parse a persisted role string. Case-insensitive: older rows carry
    /// uppercase enum names.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "agent" => Some(Role::Agent),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_accepts_both_row_generations() {
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("USER"), Some(Role::User));
        assert_eq!(Role::parse("Agent"), Some(Role::Agent));
        assert_eq!(Role::parse("system"), None);
    }

    #[test]
    fn user_constructor_sets_text_part() {
        let msg = Message::user("hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.parts.len(), 1);
        assert_eq!(msg.parts[0].as_text(), Some("hello"));
        assert!(msg.id.is_some());
    }
}
