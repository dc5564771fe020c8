//! Context Summarization
//!
//! Folds turns that fall out of the memory window into the running summary
//! using the language model.

use crate::error::ChatError;
use crate::llm::{CompletionPurpose, CompletionRequest, LanguageModel, PromptMessage};
use crate::memory::store::{format_transcript, ConversationMemory, ConversationTurn};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const SUMMARY_INSTRUCTION: &str = r#"You are an expert financial conversation summarizer.

Create a concise summary of the conversation excerpt you are given.
Focus on:
1. Financial questions asked and the answers given
2. Securities, indices or currencies mentioned, with any figures quoted
3. Goals, preferences or constraints the user revealed
4. Recommendations made

Keep it to a few short bullet points. Do not repeat what the earlier summary already says."#;

/// Result of a `maybe_summarize` pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarizeOutcome {
    /// Window not exceeded, nothing to do
    NotNeeded,
    /// This many turns were folded into the summary
    Folded { turns: usize },
    /// Memory changed while the summary was generated; retried next time
    Stale,
}

/// Summarizes conversation context with the language model
pub struct ContextSummarizer {
    model: Arc<dyn LanguageModel>,
}

impl ContextSummarizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Fold the oldest turns into the summary when the window is exceeded.
    ///
    /// The memory lock is released while the model runs. On failure the turns
    /// stay in memory and are retried at the next crossing.
    pub async fn maybe_summarize(
        &self,
        memory: &Mutex<ConversationMemory>,
    ) -> crate::Result<SummarizeOutcome> {
        let (pending, existing_summary) = {
            let memory = memory.lock().await;
            match memory.pending_fold() {
                Some(pending) => (pending, memory.summary().to_string()),
                None => return Ok(SummarizeOutcome::NotNeeded),
            }
        };

        info!("Summarizing {} turns that left the memory window", pending.len());

        let summary_text = self.summarize(&existing_summary, &pending).await?;

        let mut memory = memory.lock().await;
        if memory.apply_fold(&pending, &summary_text) {
            debug!(
                retained = memory.turn_count(),
                folded_total = memory.folded_count(),
                "Memory folded"
            );
            Ok(SummarizeOutcome::Folded {
                turns: pending.len(),
            })
        } else {
            warn!("Memory changed during summarization, fold deferred");
            Ok(SummarizeOutcome::Stale)
        }
    }

    /// Summarize `turns`, given the summary that already covers older turns
    pub async fn summarize(
        &self,
        existing_summary: &str,
        turns: &[ConversationTurn],
    ) -> crate::Result<String> {
        if turns.is_empty() {
            return Err(ChatError::LlmError(
                "Cannot summarize empty turn list".to_string(),
            ));
        }

        let request = Self::build_request(existing_summary, turns);

        match self.model.complete(&request).await {
            Ok(summary) if !summary.trim().is_empty() => Ok(summary.trim().to_string()),
            Ok(_) => {
                warn!("Summarization returned empty text");
                Err(ChatError::LlmError("Empty summary".to_string()))
            }
            Err(e) => {
                warn!("Failed to summarize context: {}", e);
                Err(e)
            }
        }
    }

    fn build_request(existing_summary: &str, turns: &[ConversationTurn]) -> CompletionRequest {
        let mut prompt = String::new();

        if !existing_summary.is_empty() {
            prompt.push_str("EARLIER SUMMARY:\n");
            prompt.push_str(existing_summary);
            prompt.push_str("\n\n");
        }

        prompt.push_str("CONVERSATION:\n---\n");
        prompt.push_str(&format_transcript(turns));
        prompt.push_str("---\n\nSUMMARY:");

        CompletionRequest {
            purpose: CompletionPurpose::Summary,
            system: SUMMARY_INSTRUCTION.to_string(),
            messages: vec![PromptMessage::user(prompt)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLanguageModel;
    use crate::memory::MemoryConfig;

    fn filled_memory(count: usize) -> Mutex<ConversationMemory> {
        let mut memory = ConversationMemory::new(MemoryConfig::new(4, 2));
        for i in 0..count {
            memory.record(ConversationTurn::user(format!("Question {}", i)));
        }
        Mutex::new(memory)
    }

    #[test]
    fn test_build_request_includes_existing_summary() {
        let turns = vec![ConversationTurn::user("What is RSI?")];
        let request = ContextSummarizer::build_request("User likes tech stocks.", &turns);

        assert_eq!(request.purpose, CompletionPurpose::Summary);
        let text = request.last_user_text().unwrap();
        assert!(text.contains("User likes tech stocks."));
        assert!(text.contains("User: What is RSI?"));
    }

    #[tokio::test]
    async fn test_not_needed_below_window() {
        let model = Arc::new(MockLanguageModel::new());
        let summarizer = ContextSummarizer::new(model.clone());
        let memory = filled_memory(4);

        let outcome = summarizer.maybe_summarize(&memory).await.unwrap();
        assert_eq!(outcome, SummarizeOutcome::NotNeeded);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_folds_oldest_turns() {
        let model = Arc::new(MockLanguageModel::new().with_summary("- asked six questions"));
        let summarizer = ContextSummarizer::new(model);
        let memory = filled_memory(6);

        let outcome = summarizer.maybe_summarize(&memory).await.unwrap();
        assert_eq!(outcome, SummarizeOutcome::Folded { turns: 4 });

        let memory = memory.lock().await;
        assert_eq!(memory.turn_count(), 2);
        assert_eq!(memory.summary(), "- asked six questions");
        assert_eq!(memory.recent_turns().next().unwrap().content, "Question 4");
    }

    #[tokio::test]
    async fn test_failure_keeps_turns() {
        let model = Arc::new(MockLanguageModel::new());
        model.set_fail_summaries(true);
        let summarizer = ContextSummarizer::new(model.clone());
        let memory = filled_memory(6);

        assert!(summarizer.maybe_summarize(&memory).await.is_err());
        assert_eq!(memory.lock().await.turn_count(), 6);
        assert!(memory.lock().await.summary().is_empty());

        model.set_fail_summaries(false);
        let outcome = summarizer.maybe_summarize(&memory).await.unwrap();
        assert_eq!(outcome, SummarizeOutcome::Folded { turns: 4 });
    }

    #[tokio::test]
    async fn test_empty_summary_is_a_failure() {
        let model = Arc::new(MockLanguageModel::new().with_summary("   "));
        let summarizer = ContextSummarizer::new(model);
        let memory = filled_memory(6);

        assert!(summarizer.maybe_summarize(&memory).await.is_err());
        assert_eq!(memory.lock().await.turn_count(), 6);
    }
}
