//! Conversation turn storage
//!
//! Stores recent turns with timestamps and the running summary of older ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Role of a turn's author
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn label(&self) -> &'static str {
        match self {
            TurnRole::User => "User",
            TurnRole::Assistant => "Assistant",
        }
    }
}

/// A single message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub turn_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: TurnRole,
    pub content: String,
    /// Approximate token count
    pub token_count: usize,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        let content = content.into();
        let token_count = (content.len() + 3) / 4;

        Self {
            turn_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content,
            token_count,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }
}

/// Window sizing for a conversation's memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Maximum retained turns; exceeding it triggers summarization
    pub window_size: usize,
    /// Newest turns kept verbatim after a fold (never more than the window)
    pub keep_recent: usize,
}

impl MemoryConfig {
    pub fn new(window_size: usize, keep_recent: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            keep_recent: keep_recent.min(window_size),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        // Two exchanges retained, one exchange kept after each fold.
        Self::new(4, 2)
    }
}

/// Prompt-ready view of the memory
#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    pub summary: String,
    pub recent_turns: Vec<ConversationTurn>,
}

impl MemoryContext {
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty() && self.recent_turns.is_empty()
    }
}

/// Recent turns plus the running summary for one session
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    config: MemoryConfig,
    summary: String,
    turns: VecDeque<ConversationTurn>,
    total_tokens: usize,
    folded_count: usize,
    updated_at: DateTime<Utc>,
}

impl ConversationMemory {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            summary: String::new(),
            turns: VecDeque::new(),
            total_tokens: 0,
            folded_count: 0,
            updated_at: Utc::now(),
        }
    }

    /// Append a turn
    pub fn record(&mut self, turn: ConversationTurn) {
        self.total_tokens += turn.token_count;
        self.turns.push_back(turn);
        self.updated_at = Utc::now();
    }

    /// Running summary plus the unsummarized tail
    pub fn context(&self) -> MemoryContext {
        MemoryContext {
            summary: self.summary.clone(),
            recent_turns: self.turns.iter().cloned().collect(),
        }
    }

    pub fn recent_turns(&self) -> impl DoubleEndedIterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    /// Turns folded into the summary over the memory's lifetime
    pub fn folded_count(&self) -> usize {
        self.folded_count
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn needs_summary(&self) -> bool {
        self.turns.len() > self.config.window_size
    }

    /// Oldest turns that have to be folded, if the window is exceeded.
    pub fn pending_fold(&self) -> Option<Vec<ConversationTurn>> {
        if !self.needs_summary() {
            return None;
        }

        let fold_count = self.turns.len() - self.config.keep_recent;
        Some(self.turns.iter().take(fold_count).cloned().collect())
    }

    /// Drop `folded` from the front and append `summary_text` to the summary.
    ///
    /// Returns false and changes nothing when `folded` is no longer the oldest
    /// run of retained turns.
    pub fn apply_fold(&mut self, folded: &[ConversationTurn], summary_text: &str) -> bool {
        if folded.is_empty() || folded.len() > self.turns.len() {
            return false;
        }

        let still_oldest = self
            .turns
            .iter()
            .zip(folded)
            .all(|(kept, old)| kept.turn_id == old.turn_id);
        if !still_oldest {
            return false;
        }

        for _ in 0..folded.len() {
            self.turns.pop_front();
        }

        let summary_text = summary_text.trim();
        if !self.summary.is_empty() {
            self.summary.push('\n');
        }
        self.summary.push_str(summary_text);

        self.folded_count += folded.len();
        self.recompute_total_tokens();
        self.updated_at = Utc::now();
        true
    }

    /// Release everything, summary included. Only used when the session closes.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.summary.clear();
        self.total_tokens = 0;
        self.folded_count = 0;
        self.updated_at = Utc::now();
    }

    /// Recompute token count (prevents drift)
    fn recompute_total_tokens(&mut self) {
        self.total_tokens = self.turns.iter().map(|t| t.token_count).sum();
    }
}

/// Render turns as `Role: content` lines
pub fn format_transcript(turns: &[ConversationTurn]) -> String {
    let mut text = String::new();

    for turn in turns {
        text.push_str(&format!("{}: {}\n", turn.role.label(), turn.content));
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_with(config: MemoryConfig, count: usize) -> ConversationMemory {
        let mut memory = ConversationMemory::new(config);
        for i in 0..count {
            let turn = if i % 2 == 0 {
                ConversationTurn::user(format!("Question {}", i))
            } else {
                ConversationTurn::assistant(format!("Answer {}", i))
            };
            memory.record(turn);
        }
        memory
    }

    #[test]
    fn test_turn_creation() {
        let turn = ConversationTurn::user("What is the S&P 500?");
        assert_eq!(turn.role, TurnRole::User);
        assert!(turn.token_count > 0);
    }

    #[test]
    fn test_config_clamps_keep_recent() {
        let config = MemoryConfig::new(3, 10);
        assert_eq!(config.window_size, 3);
        assert_eq!(config.keep_recent, 3);

        let config = MemoryConfig::new(0, 0);
        assert_eq!(config.window_size, 1);
    }

    #[test]
    fn test_record_and_context() {
        let memory = memory_with(MemoryConfig::default(), 2);
        let context = memory.context();

        assert!(context.summary.is_empty());
        assert_eq!(context.recent_turns.len(), 2);
        assert_eq!(context.recent_turns[0].content, "Question 0");
        assert!(memory.total_tokens() > 0);
    }

    #[test]
    fn test_pending_fold_only_past_window() {
        let memory = memory_with(MemoryConfig::new(4, 2), 4);
        assert!(memory.pending_fold().is_none());

        let memory = memory_with(MemoryConfig::new(4, 2), 6);
        let fold = memory.pending_fold().unwrap();
        assert_eq!(fold.len(), 4);
        assert_eq!(fold[0].content, "Question 0");
    }

    #[test]
    fn test_apply_fold_appends_summary() {
        let mut memory = memory_with(MemoryConfig::new(4, 2), 6);
        let fold = memory.pending_fold().unwrap();

        assert!(memory.apply_fold(&fold, "User asked about indices."));
        assert_eq!(memory.turn_count(), 2);
        assert_eq!(memory.summary(), "User asked about indices.");
        assert_eq!(memory.folded_count(), 4);

        for i in 6..10 {
            memory.record(ConversationTurn::user(format!("Question {}", i)));
        }
        let fold = memory.pending_fold().unwrap();
        assert!(memory.apply_fold(&fold, "Then about FX."));
        assert!(memory.summary().starts_with("User asked about indices."));
        assert!(memory.summary().ends_with("Then about FX."));
    }

    #[test]
    fn test_apply_fold_rejects_stale_turns() {
        let mut memory = memory_with(MemoryConfig::new(4, 2), 6);
        let stale = vec![ConversationTurn::user("Not in memory")];

        assert!(!memory.apply_fold(&stale, "ignored"));
        assert_eq!(memory.turn_count(), 6);
        assert!(memory.summary().is_empty());
    }

    #[test]
    fn test_clear() {
        let mut memory = memory_with(MemoryConfig::new(4, 2), 6);
        let fold = memory.pending_fold().unwrap();
        assert!(memory.apply_fold(&fold, "summary"));
        assert_eq!(memory.folded_count(), 4);

        memory.clear();
        assert!(memory.context().is_empty());
        assert_eq!(memory.total_tokens(), 0);
        assert_eq!(memory.folded_count(), 0);
        assert_eq!(memory.turn_count(), 0);
    }

    #[test]
    fn test_format_transcript() {
        let turns = vec![
            ConversationTurn::user("What is RSI?"),
            ConversationTurn::assistant("RSI is a momentum indicator..."),
        ];

        let formatted = format_transcript(&turns);
        assert!(formatted.contains("User: What is RSI?"));
        assert!(formatted.contains("Assistant: RSI"));
    }
}
