use std::sync::Arc;

use serde_json::json;
use supportdesk_agent::SupportRuntime;
use supportdesk_core::config::{AppConfig, LoadOptions};
use supportdesk_core::domain::specialist::ActiveAgent;
use supportdesk_db::InMemorySessionRepository;

use crate::bootstrap::BootstrapError;
use crate::commands::{CommandResult, CustomerArgs};

/// Renders the instructions `agent` would receive for the given customer.
/// Nothing is persisted, so no database is opened.
pub fn run(agent: &str, customer: &CustomerArgs) -> CommandResult {
    let Some(agent) = ActiveAgent::parse(agent) else {
        return CommandResult::invalid_argument(
            "prompt",
            format!("unknown agent `{agent}` (expected triage|account|billing|order|technical)"),
        );
    };
    let ctx = match customer.to_context() {
        Ok(ctx) => ctx,
        Err(message) => return CommandResult::invalid_argument("prompt", message),
    };
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return BootstrapError::from(error).into_command_result("prompt"),
    };

    let rendered = SupportRuntime::from_config(
        &config,
        Arc::new(InMemorySessionRepository::default()),
        None,
    )
    .and_then(|runtime| runtime.render_prompt(agent, &ctx));

    match rendered {
        Ok(prompt) => CommandResult::success_with_data(
            "prompt",
            prompt,
            json!({ "agent": agent.as_str(), "tier": ctx.tier().as_str() }),
        ),
        Err(error) => CommandResult::failure("prompt", "render", error.to_string(), 3),
    }
}
