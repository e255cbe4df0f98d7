pub mod chat;
pub mod config;
pub mod history;
pub mod migrate;
pub mod prompt;
pub mod reset;

use std::future::Future;

use clap::Args;
use serde::Serialize;
use serde_json::Value;
use supportdesk_core::domain::customer::{Tier, UserContext};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::ok(command, message, None)
    }

    pub fn success_with_data(command: &str, message: impl Into<String>, data: Value) -> Self {
        Self::ok(command, message, Some(data))
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn invalid_argument(command: &str, message: impl Into<String>) -> Self {
        Self::failure(command, "invalid_argument", message, 7)
    }

    pub fn persistence(command: &str, message: impl Into<String>) -> Self {
        Self::failure(command, "persistence", message, 8)
    }

    fn ok(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Drives an async command body on a fresh current-thread runtime.
pub(crate) fn block_on<F>(command: &str, body: F) -> CommandResult
where
    F: Future<Output = CommandResult>,
{
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime.block_on(body),
        Err(error) => CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        ),
    }
}

/// Who the CLI speaks as.
#[derive(Debug, Clone, Args)]
pub struct CustomerArgs {
    #[arg(long, default_value = "1", help = "Customer identifier")]
    pub customer_id: String,
    #[arg(long, default_value = "nana", help = "Customer display name")]
    pub name: String,
    #[arg(long, default_value = "ktra@example.com", help = "Customer e-mail address")]
    pub email: String,
    #[arg(long, default_value = "basic", help = "Membership tier (basic|premium|enterprise)")]
    pub tier: String,
}

impl Default for CustomerArgs {
    fn default() -> Self {
        Self {
            customer_id: "1".to_string(),
            name: "nana".to_string(),
            email: "ktra@example.com".to_string(),
            tier: "basic".to_string(),
        }
    }
}

impl CustomerArgs {
    pub fn to_context(&self) -> Result<UserContext, String> {
        let tier = Tier::parse(&self.tier).ok_or_else(|| {
            format!("unknown tier `{}` (expected basic|premium|enterprise)", self.tier)
        })?;
        Ok(UserContext::new(
            self.customer_id.clone(),
            self.name.clone(),
            self.email.clone(),
            tier,
        ))
    }
}
