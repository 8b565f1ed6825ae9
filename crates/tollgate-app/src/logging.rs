//! Logging bootstrap.

use std::path::PathBuf;

use directories::ProjectDirs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Get the logs directory path.
pub fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "tollgate", "tollgate").map(|dirs| dirs.data_dir().join("logs"))
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_directive(debug: bool, log_level: &str) -> String {
    let level = if debug { "debug" } else { log_level };
    format!("tollgate={},warn", level)
}

/// Initialize console logging plus a daily-rotated log file when the data
/// directory is writable. Keep the returned guard alive to flush the file.
pub fn init_logging(debug: bool, log_level: &str) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug, log_level)));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("tollgate")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stdout))
                    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                    .init();

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}
