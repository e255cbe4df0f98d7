use supportdesk_core::config::LoadOptions;
use supportdesk_core::domain::session::SessionId;

use crate::bootstrap::bootstrap;
use crate::commands::{block_on, CommandResult};

pub fn run(session: &str) -> CommandResult {
    let session = session.trim();
    if session.is_empty() {
        return CommandResult::invalid_argument("reset", "session id must not be empty");
    }

    block_on("reset", async {
        let app = match bootstrap(LoadOptions::default()).await {
            Ok(app) => app,
            Err(error) => return error.into_command_result("reset"),
        };
        let outcome = app.runtime.reset_session(&SessionId(session.to_string())).await;
        app.db_pool.close().await;

        match outcome {
            Ok(()) => {
                CommandResult::success("reset", format!("session `{session}` returned to triage"))
            }
            Err(error) => CommandResult::persistence("reset", error.to_string()),
        }
    })
}
