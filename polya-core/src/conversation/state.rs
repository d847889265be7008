//! Conversation State

use tracing::{debug, trace};

use super::history::{ConversationHistory, Role, Turn};

/// Everything a session remembers about the current problem.
///
/// Cleared as a whole on reset; the summary is cached at most once between
/// resets.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    /// Turn history
    history: ConversationHistory,
    /// Raw text of the first solution produced in this conversation
    first_response: Option<String>,
    /// Condensed form of `first_response`
    first_summary: Option<String>,
    /// Technique label the solution was generated under
    technique: Option<String>,
}

impl ConversationState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the turn history
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Append a turn
    pub fn push(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    /// Append an assistant turn unless it repeats the latest turn verbatim
    pub fn push_assistant(&mut self, content: &str) -> bool {
        if self.history.last().is_some_and(|t| t.content() == content) {
            debug!("skipping assistant turn identical to the previous turn");
            return false;
        }
        self.history.push(Turn::assistant(content));
        true
    }

    /// Get the selected technique
    pub fn technique(&self) -> Option<&str> {
        self.technique.as_deref()
    }

    /// Record the technique for this conversation
    pub fn set_technique(&mut self, technique: impl Into<String>) {
        self.technique = Some(technique.into());
    }

    /// Get the cached first response
    pub fn first_response(&self) -> Option<&str> {
        self.first_response.as_deref()
    }

    /// Get the cached summary
    pub fn summary(&self) -> Option<&str> {
        self.first_summary.as_deref()
    }

    /// Whether the summary has been computed since the last reset
    pub fn has_summary(&self) -> bool {
        self.first_summary.is_some()
    }

    /// Cache the first response and its summary.
    ///
    /// Returns `false` and keeps the existing values if a summary is already
    /// cached.
    pub fn cache_summary(&mut self, response: impl Into<String>, summary: impl Into<String>) -> bool {
        if self.first_summary.is_some() {
            return false;
        }
        self.first_response = Some(response.into());
        self.first_summary = Some(summary.into());
        true
    }

    /// First assistant turn within `turns`
    pub fn first_assistant(turns: &[Turn]) -> Option<&Turn> {
        turns.iter().find(|t| t.role() == Role::Assistant)
    }

    /// Drop history and every cached value
    pub fn clear(&mut self) {
        self.history.clear();
        self.first_response = None;
        self.first_summary = None;
        self.technique = None;
    }

    /// Log the history with per-turn token estimates
    pub fn dump(&self, label: &str) {
        trace!(label, turns = self.history.len(), "history dump start");
        for (i, turn) in self.history.turns().iter().enumerate() {
            trace!(
                index = i,
                role = %turn.role(),
                tokens = turn.estimate_tokens(),
                preview = %turn.preview(200),
                "turn"
            );
        }
        trace!(label, "history dump end");
    }
}
