use super::schema::{job_gpu_metrics, job_nodes, job_summary};
use chrono::NaiveDateTime;
use diesel::prelude::*;

#[derive(Queryable, Selectable, Identifiable, Debug, PartialEq, Clone)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(table_name = job_summary)]
pub struct JobSummary {
  pub id: i32,
  pub cluster: String,
  pub jobid: i64,
  pub admin_comment: String,
  pub total_time: Option<f64>,
  pub gpus: Option<f64>,
  pub created_at: NaiveDateTime,
  pub updated_at: NaiveDateTime,
}

/// Timestamps are set by the caller so that an upsert can refresh `updated_at`
/// while leaving `created_at` untouched on conflict.
#[derive(Insertable)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(table_name = job_summary)]
#[diesel(treat_none_as_default_value = false)]
pub struct NewJobSummary<'a> {
  pub cluster: &'a str,
  pub jobid: i64,
  pub admin_comment: &'a str,
  pub total_time: Option<f64>,
  pub gpus: Option<f64>,
  pub created_at: NaiveDateTime,
  pub updated_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, PartialEq, Clone)]
#[diesel(belongs_to(JobSummary))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(table_name = job_nodes)]
pub struct JobNode {
  pub id: i32,
  pub job_summary_id: i32,
  pub node_name: String,
  pub cpus: Option<f64>,
  pub total_memory: Option<f64>,
  pub used_memory: Option<f64>,
  pub total_time: Option<f64>,
}

#[derive(Insertable)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(table_name = job_nodes)]
#[diesel(treat_none_as_default_value = false)]
pub struct NewJobNode<'a> {
  pub job_summary_id: i32,
  pub node_name: &'a str,
  pub cpus: Option<f64>,
  pub total_memory: Option<f64>,
  pub used_memory: Option<f64>,
  pub total_time: Option<f64>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, PartialEq, Clone)]
#[diesel(belongs_to(JobNode))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(table_name = job_gpu_metrics)]
pub struct JobGpuMetric {
  pub id: i32,
  pub job_node_id: i32,
  pub gpu_index: String,
  pub gpu_utilization: Option<f64>,
  pub gpu_used_memory: Option<f64>,
  pub gpu_total_memory: Option<f64>,
}

#[derive(Insertable)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(table_name = job_gpu_metrics)]
#[diesel(treat_none_as_default_value = false)]
pub struct NewJobGpuMetric<'a> {
  pub job_node_id: i32,
  pub gpu_index: &'a str,
  pub gpu_utilization: Option<f64>,
  pub gpu_used_memory: Option<f64>,
  pub gpu_total_memory: Option<f64>,
}

/// Which branch the summary upsert took, together with the row id.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SummaryUpsert {
  Inserted(i32),
  Updated(i32),
}

impl SummaryUpsert {
  pub fn id(&self) -> i32 {
    match self {
      SummaryUpsert::Inserted(id) | SummaryUpsert::Updated(id) => *id,
    }
  }
}
