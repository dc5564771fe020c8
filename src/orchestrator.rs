//! AI Orchestrator
//!
//! Runs one transaction per inbound message:
//!
//! `Received → Classifying → (ToolRunning) → Composing → Replied | Failed`
//!
//! The session's turn gate is held for the whole transaction, so messages on
//! one connection are handled strictly in arrival order. State and memory
//! locks are only taken for the short reads and writes around each step.

use crate::error::ChatError;
use crate::llm::LanguageModel;
use crate::memory::{ContextSummarizer, ConversationTurn, SummarizeOutcome};
use crate::models::ToolResult;
use crate::prompt;
use crate::protocol::{FinancialDataContent, FinancialDataKind};
use crate::session::Session;
use crate::tools::{ToolDispatcher, ToolRequest};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Received,
    Classifying,
    ToolRunning,
    Composing,
    Replied,
    Failed,
}

impl TransactionState {
    pub fn can_transition_to(self, next: TransactionState) -> bool {
        use TransactionState::*;

        matches!(
            (self, next),
            (Received, Classifying)
                | (Classifying, ToolRunning)
                | (Classifying, Composing)
                | (Classifying, Failed)
                | (ToolRunning, Composing)
                | (ToolRunning, Failed)
                | (Composing, Replied)
                | (Composing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Replied | TransactionState::Failed)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Received => "received",
            TransactionState::Classifying => "classifying",
            TransactionState::ToolRunning => "tool_running",
            TransactionState::Composing => "composing",
            TransactionState::Replied => "replied",
            TransactionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One message's trip through the state machine
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: Uuid,
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    trace: Vec<TransactionState>,
}

impl Transaction {
    fn begin(session_id: Uuid) -> Self {
        let transaction = Self {
            id: Uuid::new_v4(),
            session_id,
            started_at: Utc::now(),
            trace: vec![TransactionState::Received],
        };

        debug!(
            transaction_id = %transaction.id,
            session_id = %session_id,
            state = %TransactionState::Received,
            "Transaction started"
        );

        transaction
    }

    pub fn state(&self) -> TransactionState {
        self.trace
            .last()
            .copied()
            .unwrap_or(TransactionState::Received)
    }

    pub fn trace(&self) -> &[TransactionState] {
        &self.trace
    }

    fn advance(&mut self, next: TransactionState) {
        debug_assert!(
            self.state().can_transition_to(next),
            "invalid transition {} -> {}",
            self.state(),
            next
        );

        self.trace.push(next);
        debug!(
            transaction_id = %self.id,
            session_id = %self.session_id,
            state = %next,
            "Transaction advanced"
        );
    }
}

/// Outcome of a replied transaction
#[derive(Debug, Clone)]
pub struct Reply {
    pub content: String,
    /// Intent of the tool that ran, if any
    pub action: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub transaction_id: Uuid,
    pub trace: Vec<TransactionState>,
}

impl Reply {
    fn from_transaction(
        transaction: Transaction,
        content: String,
        tool_result: Option<&ToolResult>,
    ) -> Self {
        Self {
            content,
            action: tool_result.map(|r| r.intent.as_str().to_string()),
            timestamp: Utc::now(),
            transaction_id: transaction.id,
            trace: transaction.trace,
        }
    }
}

pub struct Orchestrator {
    dispatcher: ToolDispatcher,
    model: Arc<dyn LanguageModel>,
    summarizer: ContextSummarizer,
}

impl Orchestrator {
    pub fn new(dispatcher: ToolDispatcher, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            summarizer: ContextSummarizer::new(model.clone()),
            dispatcher,
            model,
        }
    }

    /// Answer one chat message on `session`
    pub async fn handle_message(&self, session: &Session, message: &str) -> Result<Reply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::InvalidMessage(
                "message content must not be empty".to_string(),
            ));
        }

        let _turn = session.begin_turn().await?;

        let mut state = session
            .financial_state()
            .await
            .ok_or(ChatError::UninitializedSession(session.connection_id))?;

        let mut transaction = Transaction::begin(session.id);

        // ========== CLASSIFYING ==========
        transaction.advance(TransactionState::Classifying);

        let tool_result = match self.dispatcher.classify(message) {
            Some(request) => {
                // ========== TOOL RUNNING ==========
                transaction.advance(TransactionState::ToolRunning);
                info!(
                    transaction_id = %transaction.id,
                    intent = %request.intent(),
                    "Running tool"
                );

                let result = self.dispatcher.run(request, &mut state).await;
                session.store_financial_state(state.clone()).await;
                Some(result)
            }
            None => None,
        };

        // ========== COMPOSING ==========
        transaction.advance(TransactionState::Composing);

        let context = session.memory().lock().await.context();
        let request =
            prompt::build_reply_request(&state, &context, message, tool_result.as_ref());

        let completion = match self.model.complete(&request).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                transaction.advance(TransactionState::Failed);
                error!(
                    transaction_id = %transaction.id,
                    model = self.model.name(),
                    "Model returned an empty completion"
                );
                return Err(ChatError::LlmError("empty completion".to_string()));
            }
            Err(e) => {
                transaction.advance(TransactionState::Failed);
                error!(
                    transaction_id = %transaction.id,
                    model = self.model.name(),
                    "Model completion failed: {}",
                    e
                );
                return Err(e);
            }
        };

        let content = surface_tool_result(completion.trim(), tool_result.as_ref());

        // ========== REPLIED ==========
        {
            let mut memory = session.memory().lock().await;
            memory.record(ConversationTurn::user(message));
            memory.record(ConversationTurn::assistant(content.clone()));
        }
        transaction.advance(TransactionState::Replied);

        match self.summarizer.maybe_summarize(session.memory()).await {
            Ok(SummarizeOutcome::Folded { turns }) => {
                debug!(transaction_id = %transaction.id, turns, "Memory summarized")
            }
            Ok(_) => {}
            Err(e) => warn!(
                transaction_id = %transaction.id,
                "Summarization failed, turns kept for retry: {}",
                e
            ),
        }

        info!(
            transaction_id = %transaction.id,
            session_id = %session.id,
            action = tool_result.as_ref().map(|r| r.intent.as_str()).unwrap_or("none"),
            "Transaction replied"
        );

        Ok(Reply::from_transaction(
            transaction,
            content,
            tool_result.as_ref(),
        ))
    }

    /// Apply budgeting or allocation figures and answer with advice.
    ///
    /// Conversation memory is not touched.
    pub async fn apply_financial_data(
        &self,
        session: &Session,
        kind: FinancialDataKind,
        content: FinancialDataContent,
    ) -> Result<Reply> {
        let _turn = session.begin_turn().await?;

        let mut state = session
            .financial_state()
            .await
            .ok_or(ChatError::UninitializedSession(session.connection_id))?;

        let mut transaction = Transaction::begin(session.id);
        transaction.advance(TransactionState::Classifying);

        if let Some(income) = content.income {
            state.monthly_income = Some(income);
        }
        if let Some(expenses) = content.expenses {
            state.monthly_expenses = Some(expenses);
        }
        if let Some(portfolio) = content.investment_portfolio {
            state.portfolio = portfolio;
        }

        let request = match kind {
            FinancialDataKind::Budgeting => ToolRequest::BudgetAdvice {
                income: None,
                expenses: None,
            },
            FinancialDataKind::Portfolio => ToolRequest::PortfolioAdvice,
        };

        transaction.advance(TransactionState::ToolRunning);
        let result = self.dispatcher.run(request, &mut state).await;
        session.store_financial_state(state).await;

        transaction.advance(TransactionState::Composing);
        let reply_text = result.citation();
        transaction.advance(TransactionState::Replied);

        info!(
            transaction_id = %transaction.id,
            session_id = %session.id,
            data_type = ?kind,
            "Financial data applied"
        );

        Ok(Reply::from_transaction(transaction, reply_text, Some(&result)))
    }
}

/// Append the tool citation unless the reply already quotes its key figure
fn surface_tool_result(reply: &str, tool_result: Option<&ToolResult>) -> String {
    let Some(result) = tool_result else {
        return reply.to_string();
    };

    match result.key_figure() {
        Some(figure) if !reply.contains(&figure) => {
            format!("{}\n\n{}", reply, result.citation())
        }
        _ => reply.to_string(),
    }
}
