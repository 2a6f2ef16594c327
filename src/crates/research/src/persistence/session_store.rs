//! The relational tables the core consumes, narrowed to the fields this
//! crate writes: `research_sessions` and `agent_logs` (spec §6). `chats`,
//! `messages`, and `documents` belong to the caller's own schema and are
//! out of scope here; the orchestrator only needs to create/finalize a
//! session row and append one agent-log row per node.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{PersistenceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub chat_id: String,
    pub thread_id: String,
    pub query: String,
    pub status: SessionStatus,
    pub result: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct AgentLogEntry {
    pub session_id: String,
    pub agent_name: String,
    pub events: Value,
    pub latency_ms: u64,
}

/// `research_sessions` + `agent_logs` (spec §6), abstracted behind a trait
/// so the core never depends on a specific database driver — the same
/// narrow-collaborator shape as [`crate::vector::VectorIndexClient`] and
/// [`crate::memory_store::MemoryStore`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: SessionRecord) -> Result<()>;
    async fn complete_session(&self, session_id: &str, result: Value) -> Result<()>;
    async fn fail_session(&self, session_id: &str, error_message: &str) -> Result<()>;
    async fn append_agent_log(&self, entry: AgentLogEntry) -> Result<()>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    agent_logs: RwLock<Vec<AgentLogEntry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.read().unwrap().get(session_id).cloned()
    }

    pub fn agent_logs_for(&self, session_id: &str) -> Vec<AgentLogEntry> {
        self.agent_logs
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, session: SessionRecord) -> Result<()> {
        self.sessions
            .write()
            .unwrap()
            .insert(session.id.clone(), session);
        Ok(())
    }

    async fn complete_session(&self, session_id: &str, result: Value) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| PersistenceError::Session(format!("unknown session {session_id}")))?;
        session.status = SessionStatus::Completed;
        session.result = Some(result);
        Ok(())
    }

    async fn fail_session(&self, session_id: &str, error_message: &str) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| PersistenceError::Session(format!("unknown session {session_id}")))?;
        session.status = SessionStatus::Failed;
        session.result = Some(serde_json::json!({"error": error_message}));
        Ok(())
    }

    async fn append_agent_log(&self, entry: AgentLogEntry) -> Result<()> {
        self.agent_logs.write().unwrap().push(entry);
        Ok(())
    }
}
