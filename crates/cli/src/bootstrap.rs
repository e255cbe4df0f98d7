use std::sync::Arc;

use supportdesk_agent::llm::client_from_config;
use supportdesk_agent::SupportRuntime;
use supportdesk_core::audit::{AuditEvent, AuditSink};
use supportdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use supportdesk_core::errors::ApplicationError;
use supportdesk_db::{connect_with_settings, migrations, DbPool, SqlSessionRepository};
use thiserror::Error;
use tracing::info;

use crate::commands::CommandResult;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: SupportRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    LlmClient(#[source] anyhow::Error),
    #[error("support runtime setup failed: {0}")]
    Runtime(#[source] ApplicationError),
}

impl BootstrapError {
    pub fn into_command_result(self, command: &str) -> CommandResult {
        let (error_class, exit_code) = match &self {
            Self::Config(_) => ("config_validation", 2),
            Self::DatabaseConnect(_) => ("db_connectivity", 4),
            Self::Migration(_) => ("migration", 5),
            Self::LlmClient(_) => ("llm_client", 6),
            Self::Runtime(_) => ("runtime_init", 3),
        };
        let message = match &self {
            Self::Config(error) => format!("configuration issue: {error}"),
            other => other.to_string(),
        };
        CommandResult::failure(command, error_class, message, exit_code)
    }
}

/// Forwards audit events to the tracing pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        info!(
            event_name = "audit.event",
            audit_event = %event.event_type,
            session_id = %event.session_id,
            correlation_id = %event.correlation_id,
            outcome = ?event.outcome,
            metadata = %metadata,
            "audit event recorded"
        );
    }
}

/// Connects to the configured database and applies pending migrations.
pub async fn open_database(config: &AppConfig) -> Result<DbPool, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );
    Ok(db_pool)
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting support desk bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = open_database(&config).await?;
    let llm = client_from_config(&config.llm).map_err(BootstrapError::LlmClient)?;
    let sessions = Arc::new(SqlSessionRepository::new(db_pool.clone()));

    let runtime = SupportRuntime::from_config(&config, sessions, llm)
        .map_err(BootstrapError::Runtime)?
        .with_audit_sink(Arc::new(TracingAuditSink));
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        responder = ?config.responder.kind,
        classifier = ?config.gates.classifier,
        "support runtime ready"
    );

    Ok(Application { config, db_pool, runtime })
}

#[cfg(test)]
mod tests {
    use supportdesk_core::config::{ConfigOverrides, LoadOptions};
    use tempfile::TempDir;

    use super::{bootstrap, BootstrapError};

    fn file_backed(dir: &TempDir) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(format!(
                    "sqlite://{}?mode=rwc",
                    dir.path().join("bootstrap.db").display()
                )),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_runs_migrations_and_builds_runtime() {
        let dir = TempDir::new().expect("tempdir");
        let app = bootstrap(file_backed(&dir)).await.expect("bootstrap");
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'support_%'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("count tables");
        assert_eq!(tables, 2);
    }

    #[tokio::test]
    async fn missing_required_file_is_a_config_failure() {
        let dir = TempDir::new().expect("tempdir");
        let options = LoadOptions {
            config_path: Some(dir.path().join("supportdesk.toml")),
            require_file: true,
            ..file_backed(&dir)
        };
        let error = match bootstrap(options).await {
            Ok(_) => panic!("bootstrap should fail"),
            Err(error) => error,
        };
        assert!(matches!(error, BootstrapError::Config(_)));

        let result = error.into_command_result("chat");
        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("\"error_class\":\"config_validation\""));
    }
}
