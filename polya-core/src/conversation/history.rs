//! Message History Management

use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in the conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    /// Per-turn overhead added to the word count
    pub const TOKEN_OVERHEAD: usize = 4;

    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Estimate token count (whitespace-separated words plus a fixed overhead)
    pub fn estimate_tokens(&self) -> usize {
        self.content.split_whitespace().count() + Self::TOKEN_OVERHEAD
    }

    /// Single-line preview of at most `max_chars` characters
    pub fn preview(&self, max_chars: usize) -> String {
        self.content
            .replace('\n', " ")
            .chars()
            .take(max_chars)
            .collect()
    }
}

/// Ordered conversation history, oldest first. Append-only until cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Append a turn
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Get all turns
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The most recent turn
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Get turn count
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Check if history is empty
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Estimate total token count
    pub fn estimate_tokens(&self) -> usize {
        self.turns.iter().map(Turn::estimate_tokens).sum()
    }

    /// Clear all history
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_creation() {
        let turn = Turn::user("Hello");
        assert_eq!(turn.role(), Role::User);
        assert_eq!(turn.content(), "Hello");
        assert_eq!(Turn::assistant("Hi").role(), Role::Assistant);
    }

    #[test]
    fn test_estimate_tokens_counts_words() {
        assert_eq!(Turn::user("").estimate_tokens(), 4);
        assert_eq!(Turn::user("one two\nthree\t four").estimate_tokens(), 8);
        assert_eq!(Turn::user("   spaced    out   ").estimate_tokens(), 6);
    }

    #[test]
    fn test_preview() {
        let turn = Turn::assistant("line one\nline two");
        assert_eq!(turn.preview(200), "line one line two");
        assert_eq!(turn.preview(4), "line");
    }

    #[test]
    fn test_history_basic() {
        let mut history = ConversationHistory::new();
        assert!(history.is_empty());

        history.push(Turn::user("Hello"));
        history.push(Turn::assistant("Hi there"));

        assert_eq!(history.len(), 2);
        assert_eq!(history.last().map(Turn::content), Some("Hi there"));
        assert_eq!(history.estimate_tokens(), 1 + 4 + 2 + 4);

        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_history_serialization() {
        let mut history = ConversationHistory::new();
        history.push(Turn::user("2 + 2?"));

        let json = serde_json::to_string(&history).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        let restored: ConversationHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.turns(), history.turns());
    }
}
