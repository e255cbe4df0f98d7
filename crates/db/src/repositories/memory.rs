use std::collections::HashMap;

use tokio::sync::RwLock;

use supportdesk_core::domain::session::{SessionId, Turn};
use supportdesk_core::domain::specialist::ActiveAgent;

use super::{RepositoryError, SessionRepository};

#[derive(Clone, Debug, Default)]
struct SessionRecord {
    turns: Vec<Turn>,
    active_agent: ActiveAgent,
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn append_turn(&self, session_id: &SessionId, turn: Turn) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.entry(session_id.0.clone()).or_default().turns.push(turn);
        Ok(())
    }

    async fn list_turns(&self, session_id: &SessionId) -> Result<Vec<Turn>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&session_id.0).map(|record| record.turns.clone()).unwrap_or_default())
    }

    async fn clear(&self, session_id: &SessionId) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        if let Some(record) = sessions.get_mut(&session_id.0) {
            *record = SessionRecord::default();
        }
        Ok(())
    }

    async fn active_agent(&self, session_id: &SessionId) -> Result<ActiveAgent, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&session_id.0).map(|record| record.active_agent).unwrap_or_default())
    }

    async fn commit_turn(
        &self,
        session_id: &SessionId,
        turns: Vec<Turn>,
        active_agent: ActiveAgent,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions.entry(session_id.0.clone()).or_default();
        record.turns.extend(turns);
        record.active_agent = active_agent;
        Ok(())
    }
}
