//! Per-run logging context.
//!
//! A [`LoggingContext`] installs a tracing subscriber for the current thread
//! that writes to stdout and, optionally, to `logs/log_YYYY-MM-DD.log`. The
//! subscriber stays active until the context is dropped, so every pipeline
//! run owns its logging instead of relying on a process-wide logger.

use crate::config::LoggingConfig;
use crate::error::Result;
use crate::utils::ensure_dir;
use std::path::{Path, PathBuf};
use tracing::span::EnteredSpan;
use tracing::subscriber::DefaultGuard;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};
use uuid::Uuid;

const LOG_FILE_PREFIX: &str = "log";

/// Logging handle threaded through one pipeline run
pub struct LoggingContext {
    run_id: Uuid,
    log_file: Option<PathBuf>,
    // Dropped in declaration order: the subscriber first, then the file writer
    // flushes whatever is still buffered.
    _subscriber: Option<DefaultGuard>,
    _file_guard: Option<WorkerGuard>,
}

impl LoggingContext {
    /// Install a subscriber for the current thread according to `config`
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let run_id = Uuid::new_v4();

        let (file_layer, file_guard, log_file) = if config.to_file {
            ensure_dir(&config.dir)?;
            let name = log_file_name(chrono::Local::now().date_naive());
            let appender = tracing_appender::rolling::never(&config.dir, &name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_target(false).with_writer(writer);
            (Some(layer), Some(guard), Some(config.dir.join(name)))
        } else {
            (None, None, None)
        };

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
        let stdout_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

        let subscriber = Registry::default()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer);
        let default_guard = tracing::subscriber::set_default(subscriber);

        tracing::debug!(%run_id, log_file = ?log_file, "Logging initialized");

        Ok(Self {
            run_id,
            log_file,
            _subscriber: Some(default_guard),
            _file_guard: file_guard,
        })
    }

    /// A context that installs nothing; events go to whatever subscriber is
    /// already active
    pub fn disabled() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            log_file: None,
            _subscriber: None,
            _file_guard: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Enter a span tagging every event of one stage with the run id
    pub fn stage(&self, name: &'static str) -> EnteredSpan {
        tracing::info_span!("stage", stage = name, run_id = %self.run_id).entered()
    }
}

fn log_file_name(date: chrono::NaiveDate) -> String {
    format!("{LOG_FILE_PREFIX}_{}.log", date.format("%Y-%m-%d"))
}
