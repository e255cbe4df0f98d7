use async_trait::async_trait;
use thiserror::Error;

use supportdesk_core::domain::session::{SessionId, Turn};
use supportdesk_core::domain::specialist::ActiveAgent;

pub mod memory;
pub mod session;

pub use memory::InMemorySessionRepository;
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Durable store for support sessions, keyed by session id.
///
/// A session springs into existence on its first write. Reads of an unknown
/// session return an empty transcript and the triage entry point.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn append_turn(&self, session_id: &SessionId, turn: Turn) -> Result<(), RepositoryError>;

    /// Turns in insertion order.
    async fn list_turns(&self, session_id: &SessionId) -> Result<Vec<Turn>, RepositoryError>;

    /// Wipes every turn and resets the active agent to triage.
    async fn clear(&self, session_id: &SessionId) -> Result<(), RepositoryError>;

    async fn active_agent(&self, session_id: &SessionId) -> Result<ActiveAgent, RepositoryError>;

    /// Appends `turns` and moves the active agent pointer as one unit.
    async fn commit_turn(
        &self,
        session_id: &SessionId,
        turns: Vec<Turn>,
        active_agent: ActiveAgent,
    ) -> Result<(), RepositoryError>;
}
