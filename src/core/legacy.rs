
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LegacyError {
  #[error("No Slurm database connection provided")]
  NoConnection,
  #[error("Invalid cluster name '{0}'")]
  InvalidCluster(String),
  #[error("Updated {count} rows instead of 1 for job {jobid}")]
  RowCount { count: usize, jobid: i64 },
  #[error("Database operation error: {0}")]
  OperationError(#[from] diesel::result::Error),
}

/// Name of the scheduler's job table for `cluster`.
/// Only plain identifiers are accepted since the name ends up in SQL text.
pub fn job_table_name(cluster: &str) -> Result<String, LegacyError> {
  let valid = !cluster.is_empty()
    && cluster
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '_');
  if !valid {
    return Err(LegacyError::InvalidCluster(cluster.to_string()));
  }
  Ok(format!("{}_job_table", cluster))
}

/// Stores `stats` in the `admin_comment` column of the job's row in the
/// scheduler database. Exactly one row must match `jobid`; otherwise the
/// update is rolled back and an error is returned.
pub fn save_to_slurm_db(
  conn: Option<&mut SqliteConnection>,
  cluster: &str,
  jobid: i64,
  stats: &str,
) -> Result<(), LegacyError> {
  let conn = conn.ok_or(LegacyError::NoConnection)?;
  let table = job_table_name(cluster)?;
  let query = format!(r#"UPDATE "{}" SET admin_comment = ? WHERE id_job = ?"#, table);

  conn.transaction(|conn| {
    let count = diesel::sql_query(&query)
      .bind::<Text, _>(stats)
      .bind::<BigInt, _>(jobid)
      .execute(conn)?;
    if count != 1 {
      return Err(LegacyError::RowCount { count, jobid });
    }
    Ok(())
  })?;

  debug!("Stored jobstats of job {} in {}.", jobid, table);
  Ok(())
}
