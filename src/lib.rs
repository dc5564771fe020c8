//! Financial Chat Relay
//!
//! A chat backend that:
//! - Relays user messages over a persistent connection to a language model
//! - Enriches replies with live quotes, indices and FX rates
//! - Keeps a bounded, self-summarizing memory per session
//! - Serializes each session's messages while sessions run concurrently
//!
//! PER-MESSAGE LOOP:
//! RECEIVED → CLASSIFY → (RUN TOOL) → COMPOSE → REPLY → SUMMARIZE?

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod protocol;
pub mod service;
pub mod session;
pub mod tools;

pub use error::{ChatError, Result};

// Re-export common types
pub use models::*;
pub use orchestrator::{Orchestrator, Reply, TransactionState};
pub use protocol::{InboundMessage, OutboundMessage};
pub use service::ChatService;
pub use session::{Session, SessionManager, SessionRegistry};
