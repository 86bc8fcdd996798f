pub mod models;
pub mod schema;


use std::collections::HashMap;

use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::debug;
use thiserror::Error;

use crate::core::jobstats_config::{ConfigError, ConnectionTarget, ExternalDbConfig};
use crate::core::mapper::{MappedStats, map_stats};
use crate::core::payload::decode_js1_payload;

use self::models::{NewJobGpuMetric, NewJobNode, NewJobSummary, SummaryUpsert};
use self::schema::{job_gpu_metrics, job_nodes, job_summary};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Error, Debug)]
pub enum StorageError {
  #[error("Configuration error: {0}")]
  ConfigError(#[from] ConfigError),
  #[error("Could not connect to database: {0}")]
  ConnectionError(#[from] diesel::ConnectionError),
  #[error("Database migration error: {0}")]
  MigrationError(#[from] Box<dyn std::error::Error + Send + Sync>),
  #[error("Database operation error: {0}")]
  OperationError(#[from] diesel::result::Error),
  #[error("Failed to save jobstats to external database: {0}")]
  ExternalSave(Box<StorageError>),
}

/// Hands out the connection to the external database.
pub trait ConnectionProvider {
  fn connection(&mut self) -> Result<&mut SqliteConnection, StorageError>;
}

/// An already established connection.
impl ConnectionProvider for SqliteConnection {
  fn connection(&mut self) -> Result<&mut SqliteConnection, StorageError> {
    Ok(self)
  }
}

/// Opens the external database on first use and keeps the connection for the
/// lifetime of the provider. A failed attempt is not cached, so the next call
/// tries again.
pub struct LazyConnection {
  config: ExternalDbConfig,
  conn: Option<SqliteConnection>,
}

impl LazyConnection {
  pub fn new(config: ExternalDbConfig) -> Self {
    LazyConnection { config, conn: None }
  }

  pub fn is_connected(&self) -> bool {
    self.conn.is_some()
  }
}

impl ConnectionProvider for LazyConnection {
  fn connection(&mut self) -> Result<&mut SqliteConnection, StorageError> {
    let conn = match self.conn.take() {
      Some(conn) => conn,
      None => {
        let target = self.config.connection_target()?;
        establish_connection(&target)?
      }
    };
    Ok(self.conn.insert(conn))
  }
}

pub fn establish_connection(target: &ConnectionTarget) -> Result<SqliteConnection, StorageError> {
  let database_url = target.database_url.as_str();
  let mut conn = SqliteConnection::establish(database_url).map_err(StorageError::ConnectionError)?;

  // Child rows rely on ON DELETE CASCADE.
  diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut conn)?;
  if let Some(timeout) = target.busy_timeout_ms {
    diesel::sql_query(format!("PRAGMA busy_timeout = {}", timeout)).execute(&mut conn)?;
  }

  conn
    .run_pending_migrations(MIGRATIONS)
    .map_err(StorageError::MigrationError)?;

  debug!("Connected to database at {}.", database_url);
  Ok(conn)
}

/// Writes `stats` to the external schema in a single transaction.
///
/// The summary row is upserted with the raw payload and whatever could be
/// derived from it, then the node and GPU rows of the job are replaced by the
/// ones found in the payload. Nothing is written if any step fails.
pub fn save_to_external_db(
  conn: &mut SqliteConnection,
  cluster: &str,
  jobid: i64,
  stats: &str,
) -> Result<(), StorageError> {
  let decoded = decode_js1_payload(stats);
  let mapped = map_stats(decoded.as_ref());

  conn
    .immediate_transaction(|conn| write_job_stats(conn, cluster, jobid, stats, &mapped))
    .map_err(|e| StorageError::ExternalSave(Box::new(e)))
}

fn write_job_stats(
  conn: &mut SqliteConnection,
  cluster: &str,
  jobid: i64,
  stats: &str,
  mapped: &MappedStats,
) -> Result<(), StorageError> {
  let summary = upsert_job_summary(conn, cluster, jobid, stats, mapped)?;
  let summary_id = summary.id();
  debug!("Job summary for {}/{}: {:?}", cluster, jobid, summary);

  let removed = diesel::delete(job_nodes::table.filter(job_nodes::job_summary_id.eq(summary_id)))
    .execute(conn)?;
  debug!("Removed {} stale node rows for summary {}.", removed, summary_id);

  if mapped.nodes.is_empty() {
    return Ok(());
  }

  let new_nodes: Vec<NewJobNode> = mapped
    .nodes
    .iter()
    .map(|node| NewJobNode {
      job_summary_id: summary_id,
      node_name: &node.node_name,
      cpus: node.cpus,
      total_memory: node.total_memory,
      used_memory: node.used_memory,
      total_time: node.total_time,
    })
    .collect();
  diesel::insert_into(job_nodes::table)
    .values(&new_nodes)
    .execute(conn)?;

  let node_ids = get_node_ids(conn, summary_id)?;

  let mut new_gpus = Vec::new();
  for (node_name, gpus) in &mapped.node_gpus {
    let Some(&job_node_id) = node_ids.get(node_name) else {
      debug!("Node '{}' not found after insert, skipping its GPU metrics.", node_name);
      continue;
    };
    new_gpus.extend(gpus.iter().map(|gpu| NewJobGpuMetric {
      job_node_id,
      gpu_index: &gpu.gpu_index,
      gpu_utilization: gpu.utilization,
      gpu_used_memory: gpu.used_memory,
      gpu_total_memory: gpu.total_memory,
    }));
  }

  if !new_gpus.is_empty() {
    diesel::insert_into(job_gpu_metrics::table)
      .values(&new_gpus)
      .execute(conn)?;
  }

  debug!(
    "Stored {} nodes and {} GPU rows for {}/{}.",
    new_nodes.len(),
    new_gpus.len(),
    cluster,
    jobid
  );
  Ok(())
}

/// Inserts or refreshes the summary row of `(cluster, jobid)`.
/// `created_at` is only written by the insert branch.
pub fn upsert_job_summary(
  conn: &mut SqliteConnection,
  cluster: &str,
  jobid: i64,
  stats: &str,
  mapped: &MappedStats,
) -> Result<SummaryUpsert, StorageError> {
  let existing = find_job_summary_id(conn, cluster, jobid)?;

  let now = chrono::Utc::now().naive_utc();
  let new_summary = NewJobSummary {
    cluster,
    jobid,
    admin_comment: stats,
    total_time: mapped.summary.total_time,
    gpus: mapped.summary.gpus,
    created_at: now,
    updated_at: now,
  };

  let id = diesel::insert_into(job_summary::table)
    .values(&new_summary)
    .on_conflict((job_summary::cluster, job_summary::jobid))
    .do_update()
    .set((
      job_summary::admin_comment.eq(excluded(job_summary::admin_comment)),
      job_summary::total_time.eq(excluded(job_summary::total_time)),
      job_summary::gpus.eq(excluded(job_summary::gpus)),
      job_summary::updated_at.eq(excluded(job_summary::updated_at)),
    ))
    .returning(job_summary::id)
    .get_result::<i32>(conn)?;

  Ok(match existing {
    Some(_) => SummaryUpsert::Updated(id),
    None => SummaryUpsert::Inserted(id),
  })
}

pub fn find_job_summary_id(
  conn: &mut SqliteConnection,
  cluster: &str,
  jobid: i64,
) -> Result<Option<i32>, StorageError> {
  let id = job_summary::table
    .filter(job_summary::cluster.eq(cluster))
    .filter(job_summary::jobid.eq(jobid))
    .select(job_summary::id)
    .first::<i32>(conn)
    .optional()?;
  Ok(id)
}

/// Node name to row id for every node of a summary.
fn get_node_ids(
  conn: &mut SqliteConnection,
  summary_id: i32,
) -> Result<HashMap<String, i32>, StorageError> {
  let rows = job_nodes::table
    .filter(job_nodes::job_summary_id.eq(summary_id))
    .select((job_nodes::node_name, job_nodes::id))
    .load::<(String, i32)>(conn)?;
  Ok(rows.into_iter().collect())
}

/// Raw payload of the most recently updated summary row of a job.
pub fn get_job_admin_comment(
  conn: &mut SqliteConnection,
  cluster: &str,
  jobid: i64,
) -> Result<Option<String>, StorageError> {
  let admin_comment = job_summary::table
    .filter(job_summary::cluster.eq(cluster))
    .filter(job_summary::jobid.eq(jobid))
    .order(job_summary::updated_at.desc())
    .select(job_summary::admin_comment)
    .first::<String>(conn)
    .optional()?;
  Ok(admin_comment)
}
