use serde_json::json;
use supportdesk_core::config::{AppConfig, LoadOptions};
use supportdesk_db::migrations::MIGRATOR;

use crate::bootstrap::{open_database, BootstrapError};
use crate::commands::{block_on, CommandResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return BootstrapError::from(error).into_command_result("migrate"),
    };

    block_on("migrate", async {
        let pool = match open_database(&config).await {
            Ok(pool) => pool,
            Err(error) => return error.into_command_result("migrate"),
        };
        pool.close().await;

        let versions = MIGRATOR
            .iter()
            .filter(|migration| !migration.migration_type.is_down_migration())
            .map(|migration| migration.version)
            .collect::<Vec<_>>();
        let latest = versions.iter().copied().max().unwrap_or_default();
        CommandResult::success_with_data(
            "migrate",
            format!("session schema is at version {latest}"),
            json!({ "database_url": config.database.url, "versions": versions }),
        )
    })
}
