//! Boundary messages
//!
//! JSON frames are tagged by `type` and validated here; nothing past this
//! module sees raw JSON.

use crate::error::ChatError;
use crate::models::{PortfolioAllocation, UserProfile};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Declares the user profile; must precede any `message`
    Init {
        #[serde(default)]
        data: UserProfile,
    },
    Message {
        content: String,
    },
    /// Budget or allocation figures sent outside the chat text
    FinancialData {
        data_type: FinancialDataKind,
        #[serde(default)]
        content: FinancialDataContent,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinancialDataKind {
    Budgeting,
    Portfolio,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialDataContent {
    #[serde(default)]
    pub income: Option<f64>,
    #[serde(default)]
    pub expenses: Option<f64>,
    #[serde(default)]
    pub investment_portfolio: Option<PortfolioAllocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Message {
        content: String,
        is_user: bool,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<String>,
    },
    Error {
        content: String,
        timestamp: DateTime<Utc>,
    },
}

impl OutboundMessage {
    pub fn assistant(content: impl Into<String>, action: Option<String>) -> Self {
        OutboundMessage::Message {
            content: content.into(),
            is_user: false,
            timestamp: Utc::now(),
            action,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        OutboundMessage::Error {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OutboundMessage::Error { .. })
    }

    pub fn content(&self) -> &str {
        match self {
            OutboundMessage::Message { content, .. } | OutboundMessage::Error { content, .. } => {
                content
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parse and validate one inbound text frame
pub fn parse_inbound(raw: &str) -> Result<InboundMessage> {
    let message: InboundMessage = serde_json::from_str(raw)
        .map_err(|e| ChatError::InvalidMessage(format!("malformed frame: {}", e)))?;

    if let InboundMessage::Message { content } = &message {
        if content.trim().is_empty() {
            return Err(ChatError::InvalidMessage(
                "message content must not be empty".to_string(),
            ));
        }
    }

    Ok(message)
}
