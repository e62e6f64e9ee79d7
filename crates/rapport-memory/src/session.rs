use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rapport_schema::{SessionKey, Turn, TurnRole};
use tokio::sync::RwLock;

/// Default number of turns retained per session.
pub const DEFAULT_MAX_TURNS: usize = 50;

/// Per-session conversation log plus a single rolling-summary slot.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Appends one turn and returns how many turns the session has seen in
    /// total, including turns already evicted past the retention cap.
    async fn append_turn(&self, session: &SessionKey, role: TurnRole, text: &str)
        -> Result<usize>;

    /// Retained turns, oldest first, most recent last.
    async fn get_recent_turns(&self, session: &SessionKey) -> Result<Vec<Turn>>;

    /// Latest rolling summary, empty when none was stored yet.
    async fn get_summary(&self, session: &SessionKey) -> Result<String>;

    async fn set_summary(&self, session: &SessionKey, summary: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct SessionLog {
    turns: VecDeque<Turn>,
    total: usize,
    summary: String,
}

/// Process-local store. Appends are atomic per session because every write
/// happens under the map's write lock.
#[derive(Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionKey, SessionLog>>>,
    max_turns: usize,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl InMemorySessionStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_turns: max_turns.max(1),
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append_turn(
        &self,
        session: &SessionKey,
        role: TurnRole,
        text: &str,
    ) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let log = sessions.entry(session.clone()).or_default();
        log.turns.push_back(Turn::new(role, text));
        log.total += 1;
        while log.turns.len() > self.max_turns {
            log.turns.pop_front();
        }
        tracing::debug!(session = %session, total = log.total, retained = log.turns.len(), "turn appended");
        Ok(log.total)
    }

    async fn get_recent_turns(&self, session: &SessionKey) -> Result<Vec<Turn>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session)
            .map(|log| log.turns.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_summary(&self, session: &SessionKey) -> Result<String> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session)
            .map(|log| log.summary.clone())
            .unwrap_or_default())
    }

    async fn set_summary(&self, session: &SessionKey, summary: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.entry(session.clone()).or_default().summary = summary.to_string();
        Ok(())
    }
}
