//! Configures tracing for quarry. Tracing is only installed when requested, and only once per
//! process.
use std::sync::Mutex;

use anyhow::anyhow;

pub use from_env::FromEnvError;
pub use tracer::log_directory;
pub use tracer::TracerMode;

mod from_env;
mod tracer;

pub static MONITORING_GUARD: Mutex<Option<MonitoringGuard>> = Mutex::new(None);

pub struct MonitoringGuard {
  tracer: tracer::Tracer,
}

#[derive(Clone, Debug, Default)]
pub struct MonitoringOptions {
  pub tracing_options: Vec<TracerMode>,
}

impl MonitoringOptions {
  pub fn from_env() -> Result<Self, FromEnvError> {
    Ok(Self {
      tracing_options: TracerMode::from_env()?,
    })
  }
}

pub fn initialize_monitoring(options: MonitoringOptions) -> anyhow::Result<()> {
  let mut global = MONITORING_GUARD
    .lock()
    .map_err(|_| anyhow!("Monitoring guard is poisoned"))?;

  if global.is_some() {
    tracing::warn!("Monitoring is getting set-up twice, this will no-op");
    return Ok(());
  }

  let tracer = tracer::Tracer::new(&options.tracing_options)?;
  *global = Some(MonitoringGuard { tracer });

  Ok(())
}

pub fn initialize_from_env() -> anyhow::Result<()> {
  initialize_monitoring(MonitoringOptions::from_env()?)
}

/// Flushes pending log output. The subscriber stays installed, so initializing again still no-ops.
pub fn close_monitoring() {
  let Ok(mut global) = MONITORING_GUARD.lock() else {
    return;
  };

  if let Some(guard) = global.as_mut() {
    tracing::debug!("Flushing tracing output");
    guard.tracer.flush();
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_initialize_monitoring_multiple_times() {
    let options = MonitoringOptions {
      tracing_options: vec![TracerMode::Stdout],
    };

    initialize_monitoring(options.clone()).unwrap();
    close_monitoring();

    initialize_monitoring(options).unwrap();
    close_monitoring();

    assert!(MONITORING_GUARD.lock().unwrap().is_some());
  }
}
