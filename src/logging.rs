use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter, prelude::*};
use crate::config::LoggingConfig;
use crate::error::MemberlistError;

static INIT: Once = Once::new();

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. Only the first call has an effect.
pub fn init(config: &LoggingConfig) -> Result<(), MemberlistError> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = install(config);
    });
    result
}

fn install(config: &LoggingConfig) -> Result<(), MemberlistError> {
    let console = config.console.then(|| {
        fmt::Layer::new()
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_target(true)
            .with_ansi(true)
            .with_filter(filter(&config.level))
    });

    let file = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            // Daily rotation, pruned to files_to_keep
            let appender = tracing_appender::rolling::RollingFileAppender::builder()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix("memberlist")
                .filename_suffix("log")
                .max_log_files(config.files_to_keep.max(1))
                .build(dir)
                .map_err(|e| MemberlistError::Config(format!("Failed to create log appender: {}", e)))?;
            Some(
                fmt::Layer::new()
                    .json()
                    .with_writer(appender)
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_target(true)
                    .with_ansi(false)
                    .with_filter(filter(&config.level)),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry().with(console).with(file);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| MemberlistError::Config(format!("Failed to set tracing subscriber: {}", e)))
}
