use std::io::{self, BufRead, Write};

use supportdesk_agent::SupportRuntime;
use supportdesk_core::config::LoadOptions;
use supportdesk_core::domain::customer::UserContext;
use supportdesk_core::domain::session::SessionId;
use tracing::warn;

use crate::bootstrap::bootstrap;
use crate::commands::{block_on, CommandResult, CustomerArgs};

const RESET_NOTICE: &str = "(대화가 초기화되었어요. 무엇을 도와드릴까요?)";

/// Interactive session on stdin/stdout. Returns an empty output on a clean
/// exit so nothing but the conversation is printed.
pub fn run(session: &str, customer: &CustomerArgs) -> CommandResult {
    let ctx = match customer.to_context() {
        Ok(ctx) => ctx,
        Err(message) => return CommandResult::invalid_argument("chat", message),
    };
    let session_id = SessionId(session.trim().to_string());
    if session_id.0.is_empty() {
        return CommandResult::invalid_argument("chat", "session id must not be empty");
    }

    block_on("chat", async {
        let app = match bootstrap(LoadOptions::default()).await {
            Ok(app) => app,
            Err(error) => return error.into_command_result("chat"),
        };

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let banner = format!(
            "supportdesk chat | session {session_id} | {} ({})\n/reset 으로 대화를 초기화하고 /quit 으로 종료합니다.",
            ctx.name(),
            ctx.tier()
        );
        let outcome = match writeln!(stdout, "{banner}") {
            Ok(()) => converse(&app.runtime, &session_id, &ctx, stdin.lock(), &mut stdout).await,
            Err(error) => Err(error),
        };
        app.db_pool.close().await;

        match outcome {
            Ok(_) => CommandResult { exit_code: 0, output: String::new() },
            Err(error) => CommandResult::failure("chat", "io", error.to_string(), 9),
        }
    })
}

/// Feeds each input line to the runtime and streams the answer back.
/// Returns the number of turns submitted.
pub async fn converse<R, W>(
    runtime: &SupportRuntime,
    session_id: &SessionId,
    ctx: &UserContext,
    input: R,
    output: &mut W,
) -> io::Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut submitted = 0;
    write!(output, "> ")?;
    output.flush()?;

    for line in input.lines() {
        let line = line?;
        match line.trim() {
            "" => {}
            "/quit" | "/exit" => break,
            "/reset" => match runtime.reset_session(session_id).await {
                Ok(()) => writeln!(output, "{RESET_NOTICE}")?,
                Err(error) => {
                    warn!(
                        event_name = "cli.chat.reset_failed",
                        session_id = %session_id,
                        error = %error,
                        "session reset failed"
                    );
                    let interface = error.into_interface(session_id.0.clone());
                    writeln!(output, "{}", interface.user_message())?;
                }
            },
            request => {
                let mut stream = runtime.submit_turn(session_id, ctx, request).await;
                while let Some(chunk) = stream.next().await {
                    write!(output, "{}", chunk.text)?;
                    output.flush()?;
                }
                writeln!(output)?;
                submitted += 1;
            }
        }
        write!(output, "> ")?;
        output.flush()?;
    }

    writeln!(output)?;
    Ok(submitted)
}
