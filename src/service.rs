//! Chat service
//!
//! Frame-level glue shared by the WebSocket endpoint and the terminal client:
//! parse an inbound frame, route it to the session manager or orchestrator,
//! and turn the outcome (or error) into an outbound frame.

use crate::config::AppConfig;
use crate::error::ChatError;
use crate::gateway::MarketDataProvider;
use crate::llm::LanguageModel;
use crate::models::ConnectionId;
use crate::orchestrator::{Orchestrator, Reply};
use crate::protocol::{parse_inbound, InboundMessage, OutboundMessage};
use crate::session::{Session, SessionManager};
use crate::tools::ToolDispatcher;
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

const GENERIC_FAILURE: &str =
    "Sorry, I couldn't process your message right now. Please try again.";

pub struct ChatService {
    sessions: Arc<SessionManager>,
    orchestrator: Arc<Orchestrator>,
}

impl ChatService {
    pub fn new(sessions: Arc<SessionManager>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            sessions,
            orchestrator,
        }
    }

    /// Wire the service from configuration and the two collaborators
    pub fn from_config(
        config: &AppConfig,
        model: Arc<dyn LanguageModel>,
        provider: Arc<dyn MarketDataProvider>,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(provider, config.market_data.max_attempts);

        Self::new(
            Arc::new(SessionManager::new(config.memory)),
            Arc::new(Orchestrator::new(dispatcher, model)),
        )
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Open a session for a freshly accepted connection
    pub async fn connect(&self) -> Result<ConnectionId> {
        let connection_id = ConnectionId::new();
        self.sessions.open(connection_id).await?;
        Ok(connection_id)
    }

    /// Handle one raw text frame. Always yields exactly one outbound frame.
    pub async fn handle_frame(&self, connection_id: ConnectionId, raw: &str) -> OutboundMessage {
        let outcome = match parse_inbound(raw) {
            Ok(message) => self.handle_inbound(connection_id, message).await,
            Err(e) => Err(e),
        };

        outcome.unwrap_or_else(|e| {
            warn!(connection_id = %connection_id, "Frame rejected: {}", e);
            error_frame(&e)
        })
    }

    pub async fn handle_inbound(
        &self,
        connection_id: ConnectionId,
        message: InboundMessage,
    ) -> Result<OutboundMessage> {
        let session = self.session(connection_id).await?;

        match message {
            InboundMessage::Init { data } => {
                let name = data.name.clone();
                self.sessions.initialize(&session, data).await?;
                Ok(OutboundMessage::assistant(welcome_message(&name), None))
            }
            InboundMessage::Message { content } => {
                let reply = self.orchestrator.handle_message(&session, &content).await?;
                Ok(reply_frame(reply))
            }
            InboundMessage::FinancialData { data_type, content } => {
                let reply = self
                    .orchestrator
                    .apply_financial_data(&session, data_type, content)
                    .await?;
                Ok(reply_frame(reply))
            }
        }
    }

    /// Tear down the connection's session; safe to call more than once
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        self.sessions.close(&connection_id).await;
        info!(connection_id = %connection_id, "Connection closed");
    }

    async fn session(&self, connection_id: ConnectionId) -> Result<Arc<Session>> {
        self.sessions
            .get(&connection_id)
            .await
            .ok_or(ChatError::SessionClosed(connection_id))
    }
}

pub fn welcome_message(name: &str) -> String {
    format!(
        "Hello {}! I'm your financial assistant. How can I help you today?",
        name
    )
}

fn reply_frame(reply: Reply) -> OutboundMessage {
    OutboundMessage::Message {
        content: reply.content,
        is_user: false,
        timestamp: reply.timestamp,
        action: reply.action,
    }
}

/// Protocol violations echo their cause; anything else gets a generic notice
fn error_frame(error: &ChatError) -> OutboundMessage {
    if error.is_protocol_violation() {
        OutboundMessage::error(error.to_string())
    } else {
        OutboundMessage::error(GENERIC_FAILURE)
    }
}
