//! History data models
//!
//! Defines the stored turn and the role derived from its position.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Platform user identifier (snowflake)
pub type UserId = i64;

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt, never persisted
    System,
    /// Message from the user
    User,
    /// Message from the assistant/AI
    Assistant,
}

impl Role {
    /// Convert the role to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Role of the turn at `position` within a conversation
    ///
    /// Conversations always start with the user, so even positions are user
    /// turns and odd positions are assistant turns.
    pub fn for_position(position: usize) -> Self {
        if position % 2 == 0 {
            Role::User
        } else {
            Role::Assistant
        }
    }
}

/// A single stored message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Turn {
    /// Monotonic sequence number, the ordering key
    pub seq: i64,
    /// Model this turn was exchanged with
    pub model: String,
    /// Owner of the conversation
    pub user_id: UserId,
    /// Content of the message
    #[sqlx(rename = "message")]
    pub content: String,
    /// When the turn was written (Unix timestamp)
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_alternates_from_user() {
        let roles: Vec<Role> = (0..4).map(Role::for_position).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::System).unwrap();
        assert_eq!(json, r#""system""#);
    }
}
