//! Configures `tracing_subscriber` to write to rolling log files and optionally to standard output.
use std::collections::HashSet;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

use crate::from_env::optional_var;
use crate::from_env::FromEnvError;

const TRACING_MODE_VAR: &str = "QUARRY_TRACING_MODE";
const TRACING_DIR_VAR: &str = "QUARRY_TRACING_DIR";

const LOG_FILE_PREFIX: &str = "quarry-tracing";
const MAX_LOG_FILES: usize = 4;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum TracerMode {
  /// Mirror the log file output to stdout
  Stdout,
  /// Only write the rolling log files
  File,
}

impl TracerMode {
  /// Parses a comma separated list such as `stdout,file`
  pub fn from_env() -> Result<Vec<Self>, FromEnvError> {
    let Some(value) = optional_var(TRACING_MODE_VAR) else {
      return Ok(Vec::new());
    };

    let mut modes = Vec::new();
    let mut seen = HashSet::new();

    for mode in value.split(',').map(str::trim) {
      let parsed = match mode {
        "stdout" => TracerMode::Stdout,
        "file" => TracerMode::File,
        other => {
          return Err(FromEnvError::InvalidKey(
            TRACING_MODE_VAR.to_string(),
            format!("unknown tracing mode {other:?}"),
          ))
        }
      };

      if seen.insert(mode) {
        modes.push(parsed);
      }
    }

    Ok(modes)
  }
}

/// Where the rolling log files are written
pub fn log_directory() -> PathBuf {
  optional_var(TRACING_DIR_VAR)
    .map(PathBuf::from)
    .unwrap_or_else(|| std::env::temp_dir().join("quarry_trace"))
}

/// Holds the non-blocking writer guards; dropping them flushes pending log lines
pub struct Tracer {
  worker_guards: Vec<WorkerGuard>,
}

impl Tracer {
  pub fn new(modes: &[TracerMode]) -> anyhow::Result<Self> {
    let mut worker_guards = Vec::new();

    let file_appender = tracing_appender::rolling::Builder::new()
      .rotation(Rotation::HOURLY)
      .max_log_files(MAX_LOG_FILES)
      .filename_prefix(LOG_FILE_PREFIX)
      .build(log_directory())
      .map_err(|err| anyhow::anyhow!(err))?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    worker_guards.push(file_guard);

    let file_layer = tracing_subscriber::fmt::layer()
      .with_ansi(false)
      .with_writer(file_writer)
      .with_span_events(FmtSpan::CLOSE)
      .with_filter(EnvFilter::from_default_env());

    let stdout_layer = if modes.contains(&TracerMode::Stdout) {
      let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
      worker_guards.push(stdout_guard);

      Some(
        tracing_subscriber::fmt::layer()
          .with_writer(stdout_writer)
          .with_span_events(FmtSpan::CLOSE)
          .with_filter(EnvFilter::from_default_env()),
      )
    } else {
      None
    };

    let subscriber = Registry::default().with(file_layer).with(stdout_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(Self { worker_guards })
  }

  /// Drops the writer guards so buffered lines reach their destination
  pub fn flush(&mut self) {
    self.worker_guards.clear();
  }
}
