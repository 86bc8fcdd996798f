pub mod database;
pub mod jobstats_config;
pub mod legacy;
pub mod mapper;
pub mod payload;

#[cfg(test)]
mod tests;

use std::path::Path;

use diesel::SqliteConnection;
use log::error;

use crate::core::database::{ConnectionProvider, LazyConnection};
use crate::core::jobstats_config::ExternalDbConfig;

#[derive(thiserror::Error, Debug)]
pub enum JobstatsError {
  #[error("Storage Error: {0}")]
  StorageError(#[from] database::StorageError),
  #[error("Config Error: {0}")]
  ConfigError(#[from] jobstats_config::ConfigError),
}

/// Entry point for storing and retrieving jobstats.
///
/// With the external database enabled every save goes to the normalized
/// schema and lookups read from it. Otherwise saves go to the scheduler's own
/// job table through the connection supplied by the caller.
pub struct JobstatsHandler<P: ConnectionProvider = LazyConnection> {
  external_db_enabled: bool,
  provider: P,
}

impl JobstatsHandler<LazyConnection> {
  pub fn new(config: &ExternalDbConfig) -> Self {
    JobstatsHandler {
      external_db_enabled: config.enabled,
      provider: LazyConnection::new(config.clone()),
    }
  }

  pub fn from_config_file(path: &Path) -> Result<Self, JobstatsError> {
    let config = jobstats_config::get_jobstats_config(path)?;
    Ok(Self::new(&config.external_db))
  }
}

impl<P: ConnectionProvider> JobstatsHandler<P> {
  pub fn with_provider(external_db_enabled: bool, provider: P) -> Self {
    JobstatsHandler {
      external_db_enabled,
      provider,
    }
  }

  pub fn external_db_enabled(&self) -> bool {
    self.external_db_enabled
  }

  pub fn provider(&mut self) -> &mut P {
    &mut self.provider
  }

  /// Opens the external connection now instead of on first use.
  pub fn connect(&mut self) -> Result<(), JobstatsError> {
    self.provider.connection()?;
    Ok(())
  }

  /// Latest payload stored in the external database for the job.
  /// Lookup failures are logged and reported as "not found".
  pub fn get_jobstats(&mut self, cluster: &str, jobid: i64) -> Option<String> {
    if !self.external_db_enabled {
      return None;
    }

    let result = self
      .provider
      .connection()
      .and_then(|conn| database::get_job_admin_comment(conn, cluster, jobid));
    match result {
      Ok(stats) => stats,
      Err(e) => {
        error!("Failed to retrieve jobstats from external database: {}", e);
        None
      }
    }
  }

  /// Saves `stats` to the configured backend and returns the errors met on
  /// the way; an empty list means the save succeeded.
  pub fn save_jobstats(
    &mut self,
    cluster: &str,
    jobid: i64,
    stats: &str,
    slurm_conn: Option<&mut SqliteConnection>,
  ) -> Vec<String> {
    let mut errors = Vec::new();

    if self.external_db_enabled {
      let result = self
        .provider
        .connection()
        .and_then(|conn| database::save_to_external_db(conn, cluster, jobid, stats));
      if let Err(e) = result {
        error!("Saving jobstats of {}/{} failed: {}", cluster, jobid, e);
        errors.push(format!("External DB error: {}", e));
      }
    } else if let Some(conn) = slurm_conn {
      if let Err(e) = legacy::save_to_slurm_db(Some(conn), cluster, jobid, stats) {
        error!("Saving jobstats of {}/{} failed: {}", cluster, jobid, e);
        errors.push(format!("Slurm DB error: {}", e));
      }
    } else {
      errors.push("No database connection available".to_string());
    }

    errors
  }
}
