use serde_json::json;
use supportdesk_core::config::{AppConfig, LoadOptions};
use supportdesk_core::domain::session::SessionId;
use supportdesk_db::{SessionRepository, SqlSessionRepository};

use crate::bootstrap::{open_database, BootstrapError};
use crate::commands::{block_on, CommandResult};

/// Prints the stored transcript of a session and its active agent.
pub fn run(session: &str) -> CommandResult {
    let session = session.trim();
    if session.is_empty() {
        return CommandResult::invalid_argument("history", "session id must not be empty");
    }
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return BootstrapError::from(error).into_command_result("history"),
    };

    block_on("history", async {
        let pool = match open_database(&config).await {
            Ok(pool) => pool,
            Err(error) => return error.into_command_result("history"),
        };
        let sessions = SqlSessionRepository::new(pool.clone());
        let session_id = SessionId(session.to_string());

        let loaded = async {
            let turns = sessions.list_turns(&session_id).await?;
            let active = sessions.active_agent(&session_id).await?;
            Ok::<_, supportdesk_db::RepositoryError>((turns, active))
        }
        .await;
        pool.close().await;

        match loaded {
            Ok((turns, active)) => CommandResult::success_with_data(
                "history",
                format!("{} turns, active agent {active}", turns.len()),
                json!({
                    "session_id": session_id,
                    "active_agent": active.as_str(),
                    "turns": turns,
                }),
            ),
            Err(error) => CommandResult::persistence("history", error.to_string()),
        }
    })
}
