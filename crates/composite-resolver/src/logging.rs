use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_FILTER: &str = "composite_resolver=info,composite_model=info";

/// Where and how much to log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directives, used when RUST_LOG is not set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Directory for daily-rotated log files; stderr only when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// File name prefix, e.g. composite-resolver.log.2026-10-16
    pub file_prefix: String,

    /// ANSI colors on stderr
    pub ansi: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: None,
            directory: None,
            file_prefix: "composite-resolver.log".to_string(),
            ansi: true,
        }
    }
}

/// Initialize logging
///
/// The log level can be controlled via the RUST_LOG environment variable,
/// which takes precedence over the configured filter:
/// - RUST_LOG=composite_resolver=debug  (candidate selection and chains)
/// - RUST_LOG=composite_resolver=trace  (every slot binding)
///
/// Fails if a global subscriber is already installed.
pub fn init(settings: &LoggingSettings) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directives = settings.filter.as_deref().unwrap_or(DEFAULT_FILTER);
            EnvFilter::try_new(directives)
                .with_context(|| format!("Invalid log filter: {}", directives))?
        }
    };

    let file_layer = match &settings.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            let file_appender = tracing_appender::rolling::daily(dir, &settings.file_prefix);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false) // No ANSI colors in log files
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(settings.ansi)
                .with_target(false)
                .compact(),
        )
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    match &settings.directory {
        Some(dir) => tracing::info!("Logging initialized to {}", dir.display()),
        None => tracing::debug!("Logging initialized to stderr"),
    }

    Ok(())
}
