//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console and, optionally, to a
//! JSON log file per run.

use crate::config::LoggingConfig;
use crate::constants::env_vars;
use chrono::Utc;
use std::fs;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging once per process.
pub fn init_structured_logging(config: &LoggingConfig, environment: &str) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = log_filter(config, environment);
        let console = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_filter(EnvFilter::new(filter.clone()));

        let mut guard = None;
        let mut log_file = None;
        let file_layer = config.directory.as_ref().and_then(|log_dir| {
            if let Err(e) = fs::create_dir_all(log_dir) {
                eprintln!("geobatch: cannot create log directory {}: {e}", log_dir.display());
                return None;
            }
            let file_name = format!(
                "{}.{}.{}.log",
                environment,
                process::id(),
                Utc::now().format("%Y%m%d_%H%M%S")
            );
            log_file = Some(log_dir.join(&file_name));
            let appender = tracing_appender::rolling::never(log_dir, file_name);
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(filter.clone())),
            )
        });

        if tracing_subscriber::registry()
            .with(console)
            .with(file_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_file = ?log_file,
            "Structured logging initialized"
        );

        guard
    });
}

/// Filter directive: explicit env var, then config, then environment default
fn log_filter(config: &LoggingConfig, environment: &str) -> String {
    std::env::var(env_vars::LOG_FILTER)
        .ok()
        .or_else(|| config.level.clone())
        .unwrap_or_else(|| default_level(environment).to_string())
}

fn default_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for one work item transition
pub fn log_item_operation(pipeline: &str, item_id: &str, position: usize, status: &str) {
    tracing::info!(
        pipeline = %pipeline,
        item_id = %item_id,
        position = position,
        status = %status,
        "ITEM_OPERATION"
    );
}

/// Log structured data for one step execution
pub fn log_step_operation(
    pipeline: &str,
    item_id: &str,
    step_index: usize,
    step_name: &str,
    status: &str,
    duration_ms: u64,
) {
    tracing::info!(
        pipeline = %pipeline,
        item_id = %item_id,
        step_index = step_index,
        step_name = %step_name,
        status = %status,
        duration_ms = duration_ms,
        "STEP_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        "ERROR"
    );
}
