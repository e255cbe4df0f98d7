use std::process::ExitCode;

use supportdesk_core::config::{AppConfig, LoadOptions};
use tracing::Level;

fn init_logging(config: &AppConfig) {
    use supportdesk_core::config::LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

fn main() -> ExitCode {
    // Commands report configuration errors themselves; only logging needs it here.
    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }
    supportdesk_cli::run()
}
