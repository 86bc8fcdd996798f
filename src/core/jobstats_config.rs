use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;


const APP_NAME: &str = "jobstats-store";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("IO Error: {0}")]
  ConfyError(#[from] confy::ConfyError),
  #[error("Config file not found: {0}")]
  ConfigNotFound(PathBuf),
  #[error("Connection options file not found: {0}")]
  ConnectionOptionsNotFound(PathBuf),
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct JobstatsConfig {
  pub external_db: ExternalDbConfig,
}

/// Settings of the external jobstats database.
///
/// When `config_file` is set, the connection options it contains take
/// precedence over `database` alone when the connection is established.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExternalDbConfig {
  pub enabled: bool,
  pub database: String,
  pub config_file: Option<PathBuf>,
}

impl Default for ExternalDbConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      database: "jobstats.db".into(),
      config_file: None,
    }
  }
}

/// Contents of the file referenced by `ExternalDbConfig::config_file`.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
  pub directory: Option<PathBuf>,
  pub busy_timeout_ms: Option<u32>,
}

/// Fully resolved parameters used to open the external database.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionTarget {
  pub database_url: String,
  pub busy_timeout_ms: Option<u32>,
}

impl ExternalDbConfig {
  pub fn connection_target(&self) -> Result<ConnectionTarget, ConfigError> {
    let Some(config_file) = &self.config_file else {
      return Ok(ConnectionTarget {
        database_url: self.database.clone(),
        busy_timeout_ms: None,
      });
    };

    let options = get_connection_options(config_file)?;
    let database_url = match &options.directory {
      Some(dir) => dir.join(&self.database).to_string_lossy().into_owned(),
      None => self.database.clone(),
    };
    Ok(ConnectionTarget {
      database_url,
      busy_timeout_ms: options.busy_timeout_ms,
    })
  }
}

pub fn get_jobstats_config(path: &Path) -> Result<JobstatsConfig, ConfigError> {
  if !path.is_file() {
    return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
  }
  let config: JobstatsConfig = confy::load_path(path).map_err(ConfigError::ConfyError)?;
  Ok(config)
}

/// Loads the per-user configuration, creating it with defaults on first use.
pub fn get_jobstats_config_global() -> Result<JobstatsConfig, ConfigError> {
  let config: JobstatsConfig = confy::load(APP_NAME, "config").map_err(ConfigError::ConfyError)?;
  Ok(config)
}

pub fn init_jobstats_config(path: &Path) -> Result<(), ConfigError> {
  set_jobstats_config(path, &JobstatsConfig::default())
}

pub fn set_jobstats_config(path: &Path, config: &JobstatsConfig) -> Result<(), ConfigError> {
  confy::store_path(path, config).map_err(ConfigError::ConfyError)?;
  Ok(())
}

pub fn get_connection_options(path: &Path) -> Result<ConnectionOptions, ConfigError> {
  if !path.is_file() {
    return Err(ConfigError::ConnectionOptionsNotFound(path.to_path_buf()));
  }
  let options: ConnectionOptions = confy::load_path(path).map_err(ConfigError::ConfyError)?;
  Ok(options)
}
