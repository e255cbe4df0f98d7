use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use supportdesk_core::domain::session::{SessionId, Speaker, Turn, TurnKind};
use supportdesk_core::domain::specialist::{ActiveAgent, SpecialistId};

use super::{RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn append_turn(&self, session_id: &SessionId, turn: Turn) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        ensure_session(&mut tx, session_id).await?;
        insert_turns(&mut tx, session_id, vec![turn]).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_turns(&self, session_id: &SessionId) -> Result<Vec<Turn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                speaker,
                kind,
                specialist,
                content,
                created_at
             FROM support_turn
             WHERE session_id = ?
             ORDER BY seq ASC",
        )
        .bind(&session_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(turn_from_row).collect()
    }

    async fn clear(&self, session_id: &SessionId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM support_turn WHERE session_id = ?")
            .bind(&session_id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE support_session SET active_agent = ?, updated_at = ? WHERE id = ?")
            .bind(ActiveAgent::Triage.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(&session_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn active_agent(&self, session_id: &SessionId) -> Result<ActiveAgent, RepositoryError> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT active_agent FROM support_session WHERE id = ?")
                .bind(&session_id.0)
                .fetch_optional(&self.pool)
                .await?;

        match raw {
            None => Ok(ActiveAgent::default()),
            Some(value) => ActiveAgent::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown active agent `{value}`"))),
        }
    }

    async fn commit_turn(
        &self,
        session_id: &SessionId,
        turns: Vec<Turn>,
        active_agent: ActiveAgent,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        ensure_session(&mut tx, session_id).await?;
        insert_turns(&mut tx, session_id, turns).await?;
        sqlx::query("UPDATE support_session SET active_agent = ?, updated_at = ? WHERE id = ?")
            .bind(active_agent.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(&session_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

async fn ensure_session(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &SessionId,
) -> Result<(), RepositoryError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO support_session (id, active_agent, created_at, updated_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
    )
    .bind(&session_id.0)
    .bind(ActiveAgent::Triage.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_turns(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &SessionId,
    turns: Vec<Turn>,
) -> Result<(), RepositoryError> {
    let last_seq: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM support_turn WHERE session_id = ?")
            .bind(&session_id.0)
            .fetch_one(&mut **tx)
            .await?;

    for (offset, turn) in turns.into_iter().enumerate() {
        let seq = last_seq + 1 + offset as i64;
        sqlx::query(
            "INSERT INTO support_turn (
                session_id,
                seq,
                speaker,
                kind,
                specialist,
                content,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session_id.0)
        .bind(seq)
        .bind(turn.speaker.as_str())
        .bind(turn.kind.as_str())
        .bind(turn.specialist.map(|specialist| specialist.as_str()))
        .bind(&turn.content)
        .bind(turn.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

fn turn_from_row(row: SqliteRow) -> Result<Turn, RepositoryError> {
    let speaker_raw: String = row.try_get("speaker")?;
    let speaker = Speaker::parse(&speaker_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown speaker `{speaker_raw}`")))?;

    let kind_raw: String = row.try_get("kind")?;
    let kind = TurnKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown turn kind `{kind_raw}`")))?;

    let specialist = row
        .try_get::<Option<String>, _>("specialist")?
        .map(|value| {
            SpecialistId::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown specialist `{value}`")))
        })
        .transpose()?;

    Ok(Turn {
        speaker,
        kind,
        specialist,
        content: row.try_get("content")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
