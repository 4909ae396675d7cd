//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Tracing subscriber setup for acomms nodes."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "ACOMMS_LOG";
const DEFAULT_DIRECTIVE: &str = "info";
const DEFAULT_FILE_PREFIX: &str = "acomms";

static GUARDS: OnceCell<[WorkerGuard; 2]> = OnceCell::new();

/// Stdout format of a node's log stream. The rolling file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// File name of the daily log for `node`, before the date suffix.
pub fn log_file_name(config: &LoggingConfig, node: &str) -> String {
    let prefix = config.file_prefix.as_deref().unwrap_or(DEFAULT_FILE_PREFIX);
    format!("{prefix}-{node}.log")
}

/// `ACOMMS_LOG`, then `RUST_LOG`, then `info`.
fn filter_from_env() -> EnvFilter {
    let directive = std::env::var(LOG_ENV).or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV));
    match directive {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("ignoring log directive '{directive}' ({err}); using {DEFAULT_DIRECTIVE}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        Err(_) => EnvFilter::new(DEFAULT_DIRECTIVE),
    }
}

/// Install the global subscriber for `node`: stdout in the configured format plus a daily
/// rolling JSON file under `config.directory`.
///
/// Returns `false` when a subscriber was already installed, in which case nothing changes.
pub fn init_tracing(node: &str, config: &LoggingConfig) -> Result<bool> {
    fs::create_dir_all(&config.directory).with_context(|| {
        format!("unable to create log directory {}", config.directory.display())
    })?;

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, log_file_name(config, node)));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };
    let file_layer = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer)
        .boxed();

    let installed = tracing_subscriber::registry()
        .with(filter_from_env())
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();
    if !installed {
        return Ok(false);
    }
    let _ = GUARDS.set([file_guard, stdout_guard]);
    info!(
        node,
        log_dir = %config.directory.display(),
        format = ?config.format,
        "tracing initialised"
    );
    Ok(true)
}
