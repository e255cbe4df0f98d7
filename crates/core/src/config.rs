use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::specialist::{ActiveAgent, SpecialistId};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
    pub gates: GatesConfig,
    pub router: RouterConfig,
    pub responder: ResponderConfig,
    pub policy: PolicyConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Which entry points run the scope check and which specialists have their
/// drafts screened for cross-domain leaks.
#[derive(Clone, Debug)]
pub struct GatesConfig {
    pub input: BTreeSet<ActiveAgent>,
    pub output: BTreeSet<SpecialistId>,
    pub classifier: ClassifierKind,
    pub input_refusal: String,
    pub output_refusal: String,
}

#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub max_clarifications: u32,
}

#[derive(Clone, Debug)]
pub struct ResponderConfig {
    pub kind: ResponderKind,
    pub max_tool_rounds: u32,
}

/// Domain policy constants quoted in prompts and used by tools.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PolicyConfig {
    pub refund_window_days: u32,
    pub return_window_days: u32,
    pub refund_processing_days_premium: u32,
    pub refund_processing_days_basic: u32,
    pub refund_settlement_min_days: u32,
    pub refund_settlement_max_days: u32,
    pub escalation_sla_hours_premium: u32,
    pub escalation_sla_hours_basic: u32,
    pub return_label_fee_basic: Decimal,
    pub password_reset_expiry_hours: u32,
    pub payment_link_expiry_hours: u32,
    pub email_verification_expiry_minutes: u32,
    pub deactivation_delay_hours: u32,
    pub reactivation_window_days: u32,
    pub export_processing_min_hours: u32,
    pub export_processing_max_hours: u32,
    pub export_link_expiry_days: u32,
    pub billing_history_default_months: u32,
}

impl PolicyConfig {
    pub fn refund_processing_days(&self, premium: bool) -> u32 {
        if premium {
            self.refund_processing_days_premium
        } else {
            self.refund_processing_days_basic
        }
    }

    pub fn escalation_sla_hours(&self, premium: bool) -> u32 {
        if premium {
            self.escalation_sla_hours_premium
        } else {
            self.escalation_sla_hours_basic
        }
    }

    pub fn return_label_fee(&self, premium: bool) -> Decimal {
        if premium {
            Decimal::ZERO
        } else {
            self.return_label_fee_basic
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            refund_window_days: 30,
            return_window_days: 30,
            refund_processing_days_premium: 3,
            refund_processing_days_basic: 5,
            refund_settlement_min_days: 3,
            refund_settlement_max_days: 5,
            escalation_sla_hours_premium: 2,
            escalation_sla_hours_basic: 4,
            return_label_fee_basic: Decimal::new(599, 2),
            password_reset_expiry_hours: 1,
            payment_link_expiry_hours: 24,
            email_verification_expiry_minutes: 30,
            deactivation_delay_hours: 24,
            reactivation_window_days: 30,
            export_processing_min_hours: 2,
            export_processing_max_hours: 4,
            export_link_expiry_days: 7,
            billing_history_default_months: 6,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    None,
    OpenAi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    Keyword,
    Model,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderKind {
    Scripted,
    Model,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub gates_classifier: Option<ClassifierKind>,
    pub responder_kind: Option<ResponderKind>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://customer-support-memory.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::None,
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            gates: GatesConfig {
                input: [
                    ActiveAgent::Triage,
                    ActiveAgent::Specialist(SpecialistId::Account),
                    ActiveAgent::Specialist(SpecialistId::Billing),
                    ActiveAgent::Specialist(SpecialistId::Order),
                    ActiveAgent::Specialist(SpecialistId::Technical),
                ]
                .into_iter()
                .collect(),
                output: [SpecialistId::Technical].into_iter().collect(),
                classifier: ClassifierKind::Keyword,
                input_refusal: "I can't help you with that.".to_string(),
                output_refusal: "Cant show you that answer.".to_string(),
            },
            router: RouterConfig { max_clarifications: 2 },
            responder: ResponderConfig { kind: ResponderKind::Scripted, max_tool_rounds: 4 },
            policy: PolicyConfig::default(),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected none|openai)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl FromStr for ClassifierKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "model" => Ok(Self::Model),
            other => Err(ConfigError::Validation(format!(
                "unsupported gate classifier `{other}` (expected keyword|model)"
            ))),
        }
    }
}

impl FromStr for ResponderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scripted" => Ok(Self::Scripted),
            "model" => Ok(Self::Model),
            other => Err(ConfigError::Validation(format!(
                "unsupported responder kind `{other}` (expected scripted|model)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("supportdesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(gates) = patch.gates {
            if let Some(input) = gates.input {
                self.gates.input = parse_agent_list("gates.input", &input)?;
            }
            if let Some(output) = gates.output {
                self.gates.output = parse_specialist_list("gates.output", &output)?;
            }
            if let Some(classifier) = gates.classifier {
                self.gates.classifier = classifier;
            }
            if let Some(input_refusal) = gates.input_refusal {
                self.gates.input_refusal = input_refusal;
            }
            if let Some(output_refusal) = gates.output_refusal {
                self.gates.output_refusal = output_refusal;
            }
        }

        if let Some(router) = patch.router {
            if let Some(max_clarifications) = router.max_clarifications {
                self.router.max_clarifications = max_clarifications;
            }
        }

        if let Some(responder) = patch.responder {
            if let Some(kind) = responder.kind {
                self.responder.kind = kind;
            }
            if let Some(max_tool_rounds) = responder.max_tool_rounds {
                self.responder.max_tool_rounds = max_tool_rounds;
            }
        }

        if let Some(policy) = patch.policy {
            self.policy.apply_patch(policy);
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SUPPORTDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SUPPORTDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("SUPPORTDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SUPPORTDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SUPPORTDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SUPPORTDESK_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("SUPPORTDESK_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SUPPORTDESK_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("SUPPORTDESK_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SUPPORTDESK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("SUPPORTDESK_LLM_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("SUPPORTDESK_LOGGING_LEVEL").or_else(|| read_env("SUPPORTDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SUPPORTDESK_LOGGING_FORMAT").or_else(|| read_env("SUPPORTDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("SUPPORTDESK_GATES_INPUT") {
            self.gates.input = parse_agent_list("SUPPORTDESK_GATES_INPUT", &split_list(&value))?;
        }
        if let Some(value) = read_env("SUPPORTDESK_GATES_OUTPUT") {
            self.gates.output =
                parse_specialist_list("SUPPORTDESK_GATES_OUTPUT", &split_list(&value))?;
        }
        if let Some(value) = read_env("SUPPORTDESK_GATES_CLASSIFIER") {
            self.gates.classifier = value.parse()?;
        }

        if let Some(value) = read_env("SUPPORTDESK_ROUTER_MAX_CLARIFICATIONS") {
            self.router.max_clarifications =
                parse_u32("SUPPORTDESK_ROUTER_MAX_CLARIFICATIONS", &value)?;
        }

        if let Some(value) = read_env("SUPPORTDESK_RESPONDER_KIND") {
            self.responder.kind = value.parse()?;
        }
        if let Some(value) = read_env("SUPPORTDESK_RESPONDER_MAX_TOOL_ROUNDS") {
            self.responder.max_tool_rounds =
                parse_u32("SUPPORTDESK_RESPONDER_MAX_TOOL_ROUNDS", &value)?;
        }

        self.policy.apply_env_overrides()
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(classifier) = overrides.gates_classifier {
            self.gates.classifier = classifier;
        }
        if let Some(kind) = overrides.responder_kind {
            self.responder.kind = kind;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm, &self.gates, &self.responder)?;
        validate_logging(&self.logging)?;
        validate_gates(&self.gates)?;
        validate_responder(&self.responder)?;
        validate_policy(&self.policy)?;
        Ok(())
    }
}

impl PolicyConfig {
    fn apply_patch(&mut self, patch: PolicyPatch) {
        let fields: [(&mut u32, Option<u32>); 17] = [
            (&mut self.refund_window_days, patch.refund_window_days),
            (&mut self.return_window_days, patch.return_window_days),
            (&mut self.refund_processing_days_premium, patch.refund_processing_days_premium),
            (&mut self.refund_processing_days_basic, patch.refund_processing_days_basic),
            (&mut self.refund_settlement_min_days, patch.refund_settlement_min_days),
            (&mut self.refund_settlement_max_days, patch.refund_settlement_max_days),
            (&mut self.escalation_sla_hours_premium, patch.escalation_sla_hours_premium),
            (&mut self.escalation_sla_hours_basic, patch.escalation_sla_hours_basic),
            (&mut self.password_reset_expiry_hours, patch.password_reset_expiry_hours),
            (&mut self.payment_link_expiry_hours, patch.payment_link_expiry_hours),
            (&mut self.email_verification_expiry_minutes, patch.email_verification_expiry_minutes),
            (&mut self.deactivation_delay_hours, patch.deactivation_delay_hours),
            (&mut self.reactivation_window_days, patch.reactivation_window_days),
            (&mut self.export_processing_min_hours, patch.export_processing_min_hours),
            (&mut self.export_processing_max_hours, patch.export_processing_max_hours),
            (&mut self.export_link_expiry_days, patch.export_link_expiry_days),
            (&mut self.billing_history_default_months, patch.billing_history_default_months),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }
        if let Some(fee) = patch.return_label_fee_basic {
            self.return_label_fee_basic = fee;
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let fields: [(&str, &mut u32); 17] = [
            ("SUPPORTDESK_POLICY_REFUND_WINDOW_DAYS", &mut self.refund_window_days),
            ("SUPPORTDESK_POLICY_RETURN_WINDOW_DAYS", &mut self.return_window_days),
            (
                "SUPPORTDESK_POLICY_REFUND_PROCESSING_DAYS_PREMIUM",
                &mut self.refund_processing_days_premium,
            ),
            (
                "SUPPORTDESK_POLICY_REFUND_PROCESSING_DAYS_BASIC",
                &mut self.refund_processing_days_basic,
            ),
            ("SUPPORTDESK_POLICY_REFUND_SETTLEMENT_MIN_DAYS", &mut self.refund_settlement_min_days),
            ("SUPPORTDESK_POLICY_REFUND_SETTLEMENT_MAX_DAYS", &mut self.refund_settlement_max_days),
            (
                "SUPPORTDESK_POLICY_ESCALATION_SLA_HOURS_PREMIUM",
                &mut self.escalation_sla_hours_premium,
            ),
            ("SUPPORTDESK_POLICY_ESCALATION_SLA_HOURS_BASIC", &mut self.escalation_sla_hours_basic),
            (
                "SUPPORTDESK_POLICY_PASSWORD_RESET_EXPIRY_HOURS",
                &mut self.password_reset_expiry_hours,
            ),
            ("SUPPORTDESK_POLICY_PAYMENT_LINK_EXPIRY_HOURS", &mut self.payment_link_expiry_hours),
            (
                "SUPPORTDESK_POLICY_EMAIL_VERIFICATION_EXPIRY_MINUTES",
                &mut self.email_verification_expiry_minutes,
            ),
            ("SUPPORTDESK_POLICY_DEACTIVATION_DELAY_HOURS", &mut self.deactivation_delay_hours),
            ("SUPPORTDESK_POLICY_REACTIVATION_WINDOW_DAYS", &mut self.reactivation_window_days),
            (
                "SUPPORTDESK_POLICY_EXPORT_PROCESSING_MIN_HOURS",
                &mut self.export_processing_min_hours,
            ),
            (
                "SUPPORTDESK_POLICY_EXPORT_PROCESSING_MAX_HOURS",
                &mut self.export_processing_max_hours,
            ),
            ("SUPPORTDESK_POLICY_EXPORT_LINK_EXPIRY_DAYS", &mut self.export_link_expiry_days),
            (
                "SUPPORTDESK_POLICY_BILLING_HISTORY_DEFAULT_MONTHS",
                &mut self.billing_history_default_months,
            ),
        ];
        for (key, field) in fields {
            if let Some(value) = read_env(key) {
                *field = parse_u32(key, &value)?;
            }
        }

        if let Some(value) = read_env("SUPPORTDESK_POLICY_RETURN_LABEL_FEE_BASIC") {
            self.return_label_fee_basic = value.trim().parse::<Decimal>().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "SUPPORTDESK_POLICY_RETURN_LABEL_FEE_BASIC".to_string(),
                    value: value.clone(),
                }
            })?;
        }

        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("supportdesk.toml"), PathBuf::from("config/supportdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_agent_list(key: &str, values: &[String]) -> Result<BTreeSet<ActiveAgent>, ConfigError> {
    values
        .iter()
        .map(|value| {
            ActiveAgent::parse(value).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "{key} contains unknown agent `{value}` (expected triage|account|billing|order|technical)"
                ))
            })
        })
        .collect()
}

fn parse_specialist_list(
    key: &str,
    values: &[String],
) -> Result<BTreeSet<SpecialistId>, ConfigError> {
    values
        .iter()
        .map(|value| {
            SpecialistId::parse(value).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "{key} contains unknown specialist `{value}` (expected account|billing|order|technical)"
                ))
            })
        })
        .collect()
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(
    llm: &LlmConfig,
    gates: &GatesConfig,
    responder: &ResponderConfig,
) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let model_needed =
        gates.classifier == ClassifierKind::Model || responder.kind == ResponderKind::Model;

    match llm.provider {
        LlmProvider::None if model_needed => Err(ConfigError::Validation(
            "llm.provider must be configured when gates.classifier or responder.kind is `model`"
                .to_string(),
        )),
        LlmProvider::None => Ok(()),
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
            if !llm.base_url.starts_with("http://") && !llm.base_url.starts_with("https://") {
                return Err(ConfigError::Validation(
                    "llm.base_url must start with http:// or https://".to_string(),
                ));
            }
            Ok(())
        }
    }
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_gates(gates: &GatesConfig) -> Result<(), ConfigError> {
    if gates.input_refusal.trim().is_empty() || gates.output_refusal.trim().is_empty() {
        return Err(ConfigError::Validation(
            "gates.input_refusal and gates.output_refusal must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_responder(responder: &ResponderConfig) -> Result<(), ConfigError> {
    if responder.max_tool_rounds == 0 || responder.max_tool_rounds > 16 {
        return Err(ConfigError::Validation(
            "responder.max_tool_rounds must be in range 1..=16".to_string(),
        ));
    }
    Ok(())
}

fn validate_policy(policy: &PolicyConfig) -> Result<(), ConfigError> {
    if policy.refund_settlement_min_days > policy.refund_settlement_max_days {
        return Err(ConfigError::Validation(
            "policy.refund_settlement_min_days must not exceed policy.refund_settlement_max_days"
                .to_string(),
        ));
    }
    if policy.export_processing_min_hours > policy.export_processing_max_hours {
        return Err(ConfigError::Validation(
            "policy.export_processing_min_hours must not exceed policy.export_processing_max_hours"
                .to_string(),
        ));
    }
    if policy.return_label_fee_basic.is_sign_negative() {
        return Err(ConfigError::Validation(
            "policy.return_label_fee_basic must not be negative".to_string(),
        ));
    }
    if policy.billing_history_default_months == 0 {
        return Err(ConfigError::Validation(
            "policy.billing_history_default_months must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    logging: Option<LoggingPatch>,
    gates: Option<GatesPatch>,
    router: Option<RouterPatch>,
    responder: Option<ResponderPatch>,
    policy: Option<PolicyPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct GatesPatch {
    input: Option<Vec<String>>,
    output: Option<Vec<String>>,
    classifier: Option<ClassifierKind>,
    input_refusal: Option<String>,
    output_refusal: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RouterPatch {
    max_clarifications: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponderPatch {
    kind: Option<ResponderKind>,
    max_tool_rounds: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyPatch {
    refund_window_days: Option<u32>,
    return_window_days: Option<u32>,
    refund_processing_days_premium: Option<u32>,
    refund_processing_days_basic: Option<u32>,
    refund_settlement_min_days: Option<u32>,
    refund_settlement_max_days: Option<u32>,
    escalation_sla_hours_premium: Option<u32>,
    escalation_sla_hours_basic: Option<u32>,
    return_label_fee_basic: Option<Decimal>,
    password_reset_expiry_hours: Option<u32>,
    payment_link_expiry_hours: Option<u32>,
    email_verification_expiry_minutes: Option<u32>,
    deactivation_delay_hours: Option<u32>,
    reactivation_window_days: Option<u32>,
    export_processing_min_hours: Option<u32>,
    export_processing_max_hours: Option<u32>,
    export_link_expiry_days: Option<u32>,
    billing_history_default_months: Option<u32>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ClassifierKind, ConfigError, ConfigOverrides, LlmProvider, LoadOptions,
        LogFormat,
    };
    use crate::domain::specialist::{ActiveAgent, SpecialistId};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_gate_only_technical_output() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(
            config.gates.output.iter().copied().eq([SpecialistId::Technical]),
            "only the technical specialist should be output-gated by default",
        )?;
        ensure(
            config.gates.input.contains(&ActiveAgent::Triage),
            "triage should be input-gated by default",
        )?;
        ensure(config.policy.refund_window_days == 30, "refund window default should be 30 days")?;
        ensure(
            config.policy.return_label_fee_basic == Decimal::new(599, 2),
            "basic return label fee default should be 5.99",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation_and_gate_lists() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SUPPORTDESK_LLM_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("supportdesk.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "open_ai"
api_key = "${TEST_SUPPORTDESK_LLM_KEY}"

[gates]
input = ["triage"]
output = ["technical", "billing"]
classifier = "model"

[policy]
refund_window_days = 45
return_label_fee_basic = "7.50"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("sk-from-env".to_string()),
                "api key should be interpolated from environment",
            )?;
            ensure(config.gates.input.len() == 1, "input gate list should be replaced")?;
            ensure(
                config.gates.output.contains(&SpecialistId::Billing),
                "billing should be output-gated from file",
            )?;
            ensure(config.gates.classifier == ClassifierKind::Model, "classifier should be model")?;
            ensure(config.policy.refund_window_days == 45, "refund window should come from file")?;
            ensure(
                config.policy.return_label_fee_basic == Decimal::new(750, 2),
                "label fee should come from file",
            )
        })();

        clear_vars(&["TEST_SUPPORTDESK_LLM_KEY"]);
        result
    }

    #[test]
    fn policy_constants_are_environment_sourced() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SUPPORTDESK_POLICY_ESCALATION_SLA_HOURS_PREMIUM", "1");
        env::set_var("SUPPORTDESK_POLICY_RETURN_WINDOW_DAYS", "60");
        env::set_var("SUPPORTDESK_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.policy.escalation_sla_hours(true) == 1,
                "premium escalation SLA should come from env",
            )?;
            ensure(
                config.policy.escalation_sla_hours(false) == 4,
                "basic escalation SLA should keep its default",
            )?;
            ensure(config.policy.return_window_days == 60, "return window should come from env")?;
            ensure(matches!(config.logging.format, LogFormat::Json), "log format alias from env")
        })();

        clear_vars(&[
            "SUPPORTDESK_POLICY_ESCALATION_SLA_HOURS_PREMIUM",
            "SUPPORTDESK_POLICY_RETURN_WINDOW_DAYS",
            "SUPPORTDESK_LOG_FORMAT",
        ]);
        result
    }

    #[test]
    fn invalid_policy_env_value_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SUPPORTDESK_POLICY_REFUND_WINDOW_DAYS", "thirty");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override to fail".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "SUPPORTDESK_POLICY_REFUND_WINDOW_DAYS",
                "error should name the offending key",
            ),
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["SUPPORTDESK_POLICY_REFUND_WINDOW_DAYS"]);
        result
    }

    #[test]
    fn model_classifier_without_provider_fails_fast() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                gates_classifier: Some(ClassifierKind::Model),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure".to_string()),
            Err(error) => error,
        };

        ensure(
            matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.provider")
            ),
            "validation failure should mention llm.provider",
        )
    }

    #[test]
    fn api_key_is_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::OpenAi),
                llm_api_key: Some("sk-secret-value".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        let debug = format!("{config:?}");
        ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")
    }
}
