//! Conversation Memory
//!
//! Bounded buffer of recent turns plus a running summary. Turns that fall out
//! of the window are folded into the summary by the language model instead of
//! being dropped.

pub mod store;
pub mod summarizer;

pub use store::{ConversationMemory, ConversationTurn, MemoryConfig, MemoryContext, TurnRole};
pub use summarizer::{ContextSummarizer, SummarizeOutcome};
