use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use supportdesk_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::bootstrap::BootstrapError;
use crate::commands::CommandResult;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

/// Effective configuration, one line per key with the layer it came from.
/// The llm api key is never printed.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return BootstrapError::from(error).into_command_result("config"),
    };

    let file_path = detect_config_path();
    let file_doc = file_path.as_deref().and_then(load_config_file_doc);

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(&field, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    CommandResult::success("config", lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let policy = &config.policy;
    let join = |items: Vec<&str>| items.join(",");

    vec![
        Field::new("database.url", config.database.url.clone(), &["SUPPORTDESK_DATABASE_URL"]),
        Field::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["SUPPORTDESK_DATABASE_MAX_CONNECTIONS"],
        ),
        Field::new(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["SUPPORTDESK_DATABASE_TIMEOUT_SECS"],
        ),
        Field::new(
            "llm.provider",
            format!("{:?}", config.llm.provider),
            &["SUPPORTDESK_LLM_PROVIDER"],
        ),
        Field::new("llm.model", config.llm.model.clone(), &["SUPPORTDESK_LLM_MODEL"]),
        Field::new("llm.base_url", config.llm.base_url.clone(), &["SUPPORTDESK_LLM_BASE_URL"]),
        Field::new(
            "llm.api_key",
            if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" },
            &["SUPPORTDESK_LLM_API_KEY"],
        ),
        Field::new(
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            &["SUPPORTDESK_LLM_TIMEOUT_SECS"],
        ),
        Field::new(
            "logging.level",
            config.logging.level.clone(),
            &["SUPPORTDESK_LOGGING_LEVEL", "SUPPORTDESK_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["SUPPORTDESK_LOGGING_FORMAT", "SUPPORTDESK_LOG_FORMAT"],
        ),
        Field::new(
            "gates.input",
            join(config.gates.input.iter().map(|agent| agent.as_str()).collect()),
            &["SUPPORTDESK_GATES_INPUT"],
        ),
        Field::new(
            "gates.output",
            join(config.gates.output.iter().map(|specialist| specialist.as_str()).collect()),
            &["SUPPORTDESK_GATES_OUTPUT"],
        ),
        Field::new(
            "gates.classifier",
            format!("{:?}", config.gates.classifier),
            &["SUPPORTDESK_GATES_CLASSIFIER"],
        ),
        Field::new(
            "router.max_clarifications",
            config.router.max_clarifications.to_string(),
            &["SUPPORTDESK_ROUTER_MAX_CLARIFICATIONS"],
        ),
        Field::new(
            "responder.kind",
            format!("{:?}", config.responder.kind),
            &["SUPPORTDESK_RESPONDER_KIND"],
        ),
        Field::new(
            "responder.max_tool_rounds",
            config.responder.max_tool_rounds.to_string(),
            &["SUPPORTDESK_RESPONDER_MAX_TOOL_ROUNDS"],
        ),
        Field::new(
            "policy.refund_window_days",
            policy.refund_window_days.to_string(),
            &["SUPPORTDESK_POLICY_REFUND_WINDOW_DAYS"],
        ),
        Field::new(
            "policy.return_window_days",
            policy.return_window_days.to_string(),
            &["SUPPORTDESK_POLICY_RETURN_WINDOW_DAYS"],
        ),
        Field::new(
            "policy.escalation_sla_hours_premium",
            policy.escalation_sla_hours_premium.to_string(),
            &["SUPPORTDESK_POLICY_ESCALATION_SLA_HOURS_PREMIUM"],
        ),
        Field::new(
            "policy.escalation_sla_hours_basic",
            policy.escalation_sla_hours_basic.to_string(),
            &["SUPPORTDESK_POLICY_ESCALATION_SLA_HOURS_BASIC"],
        ),
        Field::new(
            "policy.return_label_fee_basic",
            policy.return_label_fee_basic.to_string(),
            &["SUPPORTDESK_POLICY_RETURN_LABEL_FEE_BASIC"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("supportdesk.toml"), PathBuf::from("config/supportdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    fs::read_to_string(path).ok()?.parse::<Value>().ok()
}

fn field_source(field: &Field, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if file_doc.is_some_and(|doc| contains_path(doc, field.key)) {
        let file_path = file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path
        .split('.')
        .try_fold(root, |current, key| current.get(key))
        .is_some()
}
