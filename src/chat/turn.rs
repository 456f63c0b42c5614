use serde::{Deserialize, Serialize};

/// Greeting shown when a chat starts with no stored history
pub const GREETING: &str = "Hello! How can I assist you today?";

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A single message in the conversation
///
/// Serialized as `{ "role": "user" | "model", "text": "..." }`, which is also
/// the persisted record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Ordered, append-only conversation history
///
/// Only the last turn may be rewritten, and only while it is an open model
/// reply (see [`Transcript::replace_last`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    /// Build a transcript from stored turns, seeding the greeting when empty
    pub fn restore(turns: Vec<ChatTurn>) -> Self {
        if turns.is_empty() {
            return Self {
                turns: vec![ChatTurn::model(GREETING)],
            };
        }
        Self { turns }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    /// Swap in a whole new last model turn. Returns its index.
    pub fn replace_last(&mut self, text: String) -> Option<usize> {
        let index = self.turns.len().checked_sub(1)?;
        let last = &mut self.turns[index];
        if last.role != Role::Model {
            return None;
        }
        *last = ChatTurn::model(text);
        Some(index)
    }
}
