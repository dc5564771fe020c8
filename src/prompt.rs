//! Reply prompt composition
//!
//! System instruction (persona, profile, running summary), then the recent
//! turns as chat messages, then the new user message with any tool result.

use crate::llm::{CompletionPurpose, CompletionRequest, PromptMessage};
use crate::memory::{MemoryContext, TurnRole};
use crate::models::{FinancialState, ToolResult};

const PERSONA: &str = r#"You are a helpful and conversational financial assistant named FinBot. You should:

1. Always respond directly to the user's question or message
2. Be friendly, conversational, and personable
3. Explain financial concepts in simple terms
4. Ask follow-up questions when you need more details
5. Provide personalized advice based on the user's risk tolerance and portfolio when known
6. When live data is provided, quote its figures exactly; when it is unavailable, say so instead of guessing
7. Remind users that this is general guidance and they should consult professional advisors for major financial decisions"#;

/// Build the reply request for `message`
pub fn build_reply_request(
    state: &FinancialState,
    context: &MemoryContext,
    message: &str,
    tool_result: Option<&ToolResult>,
) -> CompletionRequest {
    let mut messages: Vec<PromptMessage> = context
        .recent_turns
        .iter()
        .map(|turn| match turn.role {
            TurnRole::User => PromptMessage::user(turn.content.clone()),
            TurnRole::Assistant => PromptMessage::assistant(turn.content.clone()),
        })
        .collect();

    messages.push(PromptMessage::user(user_message(message, tool_result)));

    CompletionRequest {
        purpose: CompletionPurpose::Reply,
        system: system_instruction(state, &context.summary),
        messages,
    }
}

fn system_instruction(state: &FinancialState, summary: &str) -> String {
    let mut system = String::from(PERSONA);

    system.push_str("\n\nUSER PROFILE:\n");
    system.push_str(&format!("- Name: {}\n", state.name));
    system.push_str(&format!("- Risk level: {}\n", state.risk_level));
    if !state.portfolio.is_empty() {
        system.push_str(&format!(
            "- Portfolio: {:.0}% stocks, {:.0}% bonds, {:.0}% cash\n",
            state.portfolio.stocks, state.portfolio.bonds, state.portfolio.cash
        ));
    }
    if let Some(income) = state.monthly_income {
        system.push_str(&format!("- Monthly income: {:.2}\n", income));
    }
    if let Some(expenses) = state.monthly_expenses {
        system.push_str(&format!("- Monthly expenses: {:.2}\n", expenses));
    }

    if !summary.is_empty() {
        system.push_str("\nEARLIER CONVERSATION SUMMARY:\n");
        system.push_str(summary);
        system.push('\n');
    }

    system
}

fn user_message(message: &str, tool_result: Option<&ToolResult>) -> String {
    let Some(result) = tool_result else {
        return message.to_string();
    };

    let status = if result.is_success() { "ok" } else { "failed" };

    format!(
        "{}\n\n[LIVE DATA: {} ({})]\n{}\n[END LIVE DATA]",
        message,
        result.intent,
        status,
        result.citation()
    )
}
