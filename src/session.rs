//! Session Lifecycle Manager
//!
//! One [`Session`] per live connection, kept in a [`SessionRegistry`] keyed by
//! connection identity. A session's transactions run one at a time behind its
//! turn gate; financial state and memory sit behind their own short locks that
//! are never held across provider or model calls.

use crate::error::ChatError;
use crate::memory::{ConversationMemory, MemoryConfig};
use crate::models::{ConnectionId, FinancialState, UserProfile};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Held for the duration of one transaction
pub type TurnGuard<'a> = MutexGuard<'a, ()>;

#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub connection_id: ConnectionId,
    pub created_at: DateTime<Utc>,
    state: Mutex<Option<FinancialState>>,
    memory: Mutex<ConversationMemory>,
    /// FIFO gate: tokio's mutex queues waiters in arrival order
    turn_gate: Mutex<()>,
    closed: AtomicBool,
}

impl Session {
    fn new(connection_id: ConnectionId, memory_config: MemoryConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection_id,
            created_at: Utc::now(),
            state: Mutex::new(None),
            memory: Mutex::new(ConversationMemory::new(memory_config)),
            turn_gate: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait for this session's turn. Fails once the session is closed.
    pub async fn begin_turn(&self) -> Result<TurnGuard<'_>> {
        let guard = self.turn_gate.lock().await;
        if self.is_closed() {
            return Err(ChatError::SessionClosed(self.connection_id));
        }
        Ok(guard)
    }

    pub fn memory(&self) -> &Mutex<ConversationMemory> {
        &self.memory
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Copy of the financial state; `None` before `init`
    pub async fn financial_state(&self) -> Option<FinancialState> {
        self.state.lock().await.clone()
    }

    /// Replace the financial state. Callers hold the turn gate.
    pub async fn store_financial_state(&self, state: FinancialState) {
        *self.state.lock().await = Some(state);
    }

    async fn apply_profile(&self, profile: UserProfile) -> bool {
        let mut state = self.state.lock().await;
        match state.as_mut() {
            Some(existing) => {
                existing.apply_profile(profile);
                false
            }
            None => {
                *state = Some(FinancialState::from_profile(profile));
                true
            }
        }
    }

    async fn release(&self) {
        self.closed.store(true, Ordering::SeqCst);
        *self.state.lock().await = None;
        self.memory.lock().await.clear();
    }
}

// =============================
// Registry
// =============================

/// Process-wide map from connection identity to live session
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ConnectionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert(&self, session: Arc<Session>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.connection_id) {
            return Err(ChatError::DuplicateSession(session.connection_id));
        }
        sessions.insert(session.connection_id, session);
        Ok(())
    }

    async fn remove(&self, connection_id: &ConnectionId) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(connection_id)
    }

    pub async fn get(&self, connection_id: &ConnectionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(connection_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        self.sessions.read().await.keys().copied().collect()
    }
}

// =============================
// Manager
// =============================

/// Creates, initializes and tears down sessions
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    memory_config: MemoryConfig,
}

impl SessionManager {
    pub fn new(memory_config: MemoryConfig) -> Self {
        Self::with_registry(Arc::new(SessionRegistry::new()), memory_config)
    }

    pub fn with_registry(registry: Arc<SessionRegistry>, memory_config: MemoryConfig) -> Self {
        Self {
            registry,
            memory_config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Create the session owned by `connection_id`
    pub async fn open(&self, connection_id: ConnectionId) -> Result<Arc<Session>> {
        let session = Arc::new(Session::new(connection_id, self.memory_config));
        self.registry.insert(session.clone()).await?;

        info!(
            session_id = %session.id,
            connection_id = %connection_id,
            "Session opened"
        );

        Ok(session)
    }

    /// Populate the financial state from the client's profile.
    ///
    /// Runs in turn order with chat messages. Re-initializing replaces the
    /// profile and keeps the conversation memory.
    pub async fn initialize(&self, session: &Session, profile: UserProfile) -> Result<()> {
        let _turn = session.begin_turn().await?;

        let risk_level = profile.risk_level;
        let first = session.apply_profile(profile).await;

        info!(
            session_id = %session.id,
            risk_level = %risk_level,
            reinitialized = !first,
            "Session initialized"
        );

        Ok(())
    }

    /// Release the session owned by `connection_id`.
    ///
    /// Waits for the in-flight transaction, if any. Closing twice is a no-op.
    pub async fn close(&self, connection_id: &ConnectionId) {
        let Some(session) = self.registry.get(connection_id).await else {
            debug!(connection_id = %connection_id, "Close on unknown session ignored");
            return;
        };

        {
            let _turn = session.turn_gate.lock().await;
            if session.is_closed() {
                return;
            }
            session.release().await;
        }

        self.registry.remove(connection_id).await;

        info!(
            session_id = %session.id,
            connection_id = %connection_id,
            "Session closed"
        );
    }

    pub async fn get(&self, connection_id: &ConnectionId) -> Option<Arc<Session>> {
        self.registry.get(connection_id).await
    }

    pub async fn active_count(&self) -> usize {
        self.registry.len().await
    }

    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        self.registry.connection_ids().await
    }
}
