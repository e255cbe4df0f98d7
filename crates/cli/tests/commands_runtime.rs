use std::env;
use std::io::Cursor;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use supportdesk_cli::bootstrap::bootstrap;
use supportdesk_cli::commands::{chat, config, history, migrate, prompt, reset, CustomerArgs};
use supportdesk_core::config::LoadOptions;
use supportdesk_core::domain::session::SessionId;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("SUPPORTDESK_DATABASE_URL", database_url(&dir).as_str())], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["versions"][0], 1);
    });
}

#[test]
fn migrate_returns_config_failure_on_invalid_override() {
    with_env(&[("SUPPORTDESK_ROUTER_MAX_CLARIFICATIONS", "many")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_redacts_api_key_and_attributes_sources() {
    with_env(
        &[
            ("SUPPORTDESK_LLM_PROVIDER", "openai"),
            ("SUPPORTDESK_LLM_API_KEY", "sk-live-very-secret"),
            ("SUPPORTDESK_POLICY_REFUND_WINDOW_DAYS", "45"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            let payload = parse_payload(&result.output);
            let message = payload["message"].as_str().unwrap_or_default();
            assert!(!message.contains("sk-live-very-secret"));
            assert!(message
                .contains("- llm.api_key = <redacted> (source: env (SUPPORTDESK_LLM_API_KEY))"));
            assert!(message.contains(
                "- policy.refund_window_days = 45 (source: env (SUPPORTDESK_POLICY_REFUND_WINDOW_DAYS))"
            ));
            assert!(message.contains("- gates.output = technical (source: default)"));
        },
    );
}

#[test]
fn history_of_unknown_session_is_empty_triage() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("SUPPORTDESK_DATABASE_URL", database_url(&dir).as_str())], || {
        let result = history::run("never-used");
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["active_agent"], "triage");
        assert_eq!(payload["data"]["turns"].as_array().map(Vec::len), Some(0));
    });
}

#[test]
fn chat_transcript_is_visible_to_history_and_cleared_by_reset() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("SUPPORTDESK_DATABASE_URL", database_url(&dir).as_str())], || {
        let transcript = run_chat("cli-demo", "환불이 필요해요\n\n오류가 떠요\n/quit\n무시됨\n");
        assert!(transcript.contains("결제 지원 담당 전문가에게 연결해드릴게요."));
        assert!(transcript.contains("기술 지원 담당 전문가에게 연결해드릴게요."));
        assert!(!transcript.contains("무시됨"));

        let listed = parse_payload(&history::run("cli-demo").output);
        assert_eq!(listed["data"]["active_agent"], "technical");
        let turns = listed["data"]["turns"].as_array().cloned().unwrap_or_default();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0]["content"], "환불이 필요해요");
        assert_eq!(turns[1]["specialist"], "billing");
        assert_eq!(turns[2]["speaker"], "user");

        let cleared = reset::run("cli-demo");
        assert_eq!(cleared.exit_code, 0);
        assert_eq!(parse_payload(&cleared.output)["status"], "ok");

        let listed = parse_payload(&history::run("cli-demo").output);
        assert_eq!(listed["data"]["active_agent"], "triage");
        assert_eq!(listed["data"]["turns"].as_array().map(Vec::len), Some(0));
    });
}

#[test]
fn chat_reset_command_returns_session_to_triage() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("SUPPORTDESK_DATABASE_URL", database_url(&dir).as_str())], || {
        let transcript = run_chat("cli-reset", "로그인이 안 돼요\n/reset\n");
        assert!(transcript.contains("대화가 초기화되었어요"));

        let listed = parse_payload(&history::run("cli-reset").output);
        assert_eq!(listed["data"]["active_agent"], "triage");
        assert_eq!(listed["data"]["turns"].as_array().map(Vec::len), Some(0));
    });
}

#[test]
fn prompt_renders_premium_billing_instructions() {
    with_env(&[], || {
        let customer = CustomerArgs { tier: "premium".to_string(), ..CustomerArgs::default() };
        let result = prompt::run("billing", &customer);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let rendered = payload["message"].as_str().unwrap_or_default();
        assert!(rendered.contains("(Premium Billing Support)"));
        assert!(rendered.contains("nana"));
        assert_eq!(payload["data"]["tier"], "premium");
    });
}

#[test]
fn prompt_rejects_unknown_agents_and_tiers() {
    with_env(&[], || {
        let unknown_agent = prompt::run("sales", &CustomerArgs::default());
        assert_eq!(unknown_agent.exit_code, 7);
        assert_eq!(parse_payload(&unknown_agent.output)["error_class"], "invalid_argument");

        let customer = CustomerArgs { tier: "gold".to_string(), ..CustomerArgs::default() };
        let unknown_tier = prompt::run("triage", &customer);
        assert_eq!(unknown_tier.exit_code, 7);
    });
}

fn run_chat(session: &str, script: &str) -> String {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    runtime.block_on(async {
        let app = bootstrap(LoadOptions::default()).await.expect("bootstrap");
        let ctx = CustomerArgs::default().to_context().expect("customer");
        let mut output = Vec::new();
        chat::converse(
            &app.runtime,
            &SessionId(session.to_string()),
            &ctx,
            Cursor::new(script.as_bytes()),
            &mut output,
        )
        .await
        .expect("converse");
        app.db_pool.close().await;
        String::from_utf8(output).expect("utf-8 transcript")
    })
}

fn database_url(dir: &TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("cli.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SUPPORTDESK_DATABASE_URL",
        "SUPPORTDESK_DATABASE_MAX_CONNECTIONS",
        "SUPPORTDESK_DATABASE_TIMEOUT_SECS",
        "SUPPORTDESK_LLM_PROVIDER",
        "SUPPORTDESK_LLM_API_KEY",
        "SUPPORTDESK_LLM_BASE_URL",
        "SUPPORTDESK_LLM_MODEL",
        "SUPPORTDESK_LLM_TIMEOUT_SECS",
        "SUPPORTDESK_LOGGING_LEVEL",
        "SUPPORTDESK_LOGGING_FORMAT",
        "SUPPORTDESK_LOG_LEVEL",
        "SUPPORTDESK_LOG_FORMAT",
        "SUPPORTDESK_GATES_INPUT",
        "SUPPORTDESK_GATES_OUTPUT",
        "SUPPORTDESK_GATES_CLASSIFIER",
        "SUPPORTDESK_ROUTER_MAX_CLARIFICATIONS",
        "SUPPORTDESK_RESPONDER_KIND",
        "SUPPORTDESK_RESPONDER_MAX_TOOL_ROUNDS",
        "SUPPORTDESK_POLICY_REFUND_WINDOW_DAYS",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
