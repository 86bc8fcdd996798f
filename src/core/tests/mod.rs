use crate::core::{
  JobstatsHandler,
  database::{ConnectionProvider, LazyConnection, get_job_admin_comment, tests::connection_for_tests},
  jobstats_config::{ExternalDbConfig, get_jobstats_config, set_jobstats_config, tests::init_jobstats_for_tests},
  legacy::tests::{load_jobs, slurm_db_for_tests},
  payload::tests::js1_from_text,
};

fn external_config(dir: &tempfile::TempDir, enabled: bool) -> ExternalDbConfig {
  ExternalDbConfig {
    enabled,
    database: dir.path().join("external.db").to_string_lossy().into_owned(),
    config_file: None,
  }
}

#[test]
fn external_mode_ignores_legacy_connection() {
  let dir = tempfile::tempdir().unwrap();
  let mut handler = JobstatsHandler::new(&external_config(&dir, true));
  let mut slurm = slurm_db_for_tests("della", &[77]);

  let stats = js1_from_text(r#"{"total_time":120,"nodes":{"n1":{"cpus":4}}}"#);
  let errors = handler.save_jobstats("della", 77, &stats, Some(&mut slurm));
  assert!(errors.is_empty(), "{:?}", errors);

  assert_eq!(load_jobs(&mut slurm, "della"), vec![(77, None)]);
  assert_eq!(handler.get_jobstats("della", 77), Some(stats));
}

#[test]
fn legacy_mode_writes_scheduler_table() {
  let dir = tempfile::tempdir().unwrap();
  let mut handler = JobstatsHandler::new(&external_config(&dir, false));
  let mut slurm = slurm_db_for_tests("della", &[77]);

  let errors = handler.save_jobstats("della", 77, "JS1:Short", Some(&mut slurm));
  assert!(errors.is_empty(), "{:?}", errors);
  assert_eq!(
    load_jobs(&mut slurm, "della"),
    vec![(77, Some("JS1:Short".to_string()))]
  );
  // Neither path touched the external database.
  assert!(!handler.provider().is_connected());
  assert!(!dir.path().join("external.db").exists());
}

#[test]
fn legacy_failures_are_labelled() {
  let dir = tempfile::tempdir().unwrap();
  let mut handler = JobstatsHandler::new(&external_config(&dir, false));
  let mut slurm = slurm_db_for_tests("della", &[1, 1]);

  let errors = handler.save_jobstats("della", 1, "JS1:None", Some(&mut slurm));
  assert_eq!(
    errors,
    vec!["Slurm DB error: Updated 2 rows instead of 1 for job 1".to_string()]
  );
  assert_eq!(load_jobs(&mut slurm, "della"), vec![(1, None), (1, None)]);
}

#[test]
fn no_connection_available() {
  let dir = tempfile::tempdir().unwrap();
  let mut handler = JobstatsHandler::new(&external_config(&dir, false));
  let errors = handler.save_jobstats("della", 1, "JS1:None", None);
  assert_eq!(errors, vec!["No database connection available".to_string()]);
}

#[test]
fn external_failures_are_labelled() {
  let (_dir, conn) = connection_for_tests();
  let mut handler = JobstatsHandler::with_provider(true, conn);
  diesel::RunQueryDsl::execute(
    diesel::sql_query("DROP TABLE job_gpu_metrics"),
    handler.provider(),
  )
  .unwrap();

  let stats = js1_from_text(r#"{"nodes":{"n1":{"gpu_utilization":{"0":85}}}}"#);
  let errors = handler.save_jobstats("della", 2, &stats, None);
  assert_eq!(errors.len(), 1);
  assert!(
    errors[0].starts_with("External DB error: Failed to save jobstats to external database:"),
    "{}",
    errors[0]
  );
  assert_eq!(handler.get_jobstats("della", 2), None);
}

#[test]
fn connection_failures_are_labelled() {
  let config = ExternalDbConfig {
    enabled: true,
    database: "/nonexistent/dir/external.db".to_string(),
    config_file: None,
  };
  let mut handler = JobstatsHandler::new(&config);
  let errors = handler.save_jobstats("della", 1, "JS1:None", None);
  assert_eq!(errors.len(), 1);
  assert!(
    errors[0].starts_with("External DB error: Could not connect to database:"),
    "{}",
    errors[0]
  );
  assert!(!handler.provider().is_connected());
  assert!(handler.connect().is_err());
}

#[test]
fn get_is_disabled_without_external_db() {
  let (_dir, mut conn) = connection_for_tests();
  crate::core::database::save_to_external_db(&mut conn, "della", 5, "JS1:None").unwrap();

  let mut handler = JobstatsHandler::with_provider(false, conn);
  assert_eq!(handler.get_jobstats("della", 5), None);

  let conn = handler.provider();
  assert_eq!(
    get_job_admin_comment(conn, "della", 5).unwrap(),
    Some("JS1:None".to_string())
  );
}

#[test]
fn get_swallows_connection_errors() {
  let config = ExternalDbConfig {
    enabled: true,
    database: "/nonexistent/dir/external.db".to_string(),
    config_file: None,
  };
  let mut handler = JobstatsHandler::new(&config);
  assert_eq!(handler.get_jobstats("della", 1), None);
}

#[test]
fn get_returns_latest_save() {
  let dir = tempfile::tempdir().unwrap();
  let mut handler = JobstatsHandler::new(&external_config(&dir, true));
  assert_eq!(handler.get_jobstats("della", 3), None);

  assert!(handler.save_jobstats("della", 3, "JS1:Short", None).is_empty());
  let stats = js1_from_text(r#"{"total_time":60}"#);
  assert!(handler.save_jobstats("della", 3, &stats, None).is_empty());
  assert_eq!(handler.get_jobstats("della", 3), Some(stats));
  assert_eq!(handler.get_jobstats("tiger", 3), None);
}

#[test]
fn handler_from_config_file() {
  let temp_dir = init_jobstats_for_tests();
  let config_path = temp_dir.path().join("jobstats.conf");
  let mut config = get_jobstats_config(&config_path).unwrap();
  config.external_db = external_config(&temp_dir, true);
  set_jobstats_config(&config_path, &config).unwrap();

  let mut handler = JobstatsHandler::from_config_file(&config_path).unwrap();
  assert!(handler.external_db_enabled());
  assert!(handler.save_jobstats("della", 12, "JS1:None", None).is_empty());

  let provider: &mut LazyConnection = handler.provider();
  assert!(provider.is_connected());
  assert_eq!(
    get_job_admin_comment(provider.connection().unwrap(), "della", 12).unwrap(),
    Some("JS1:None".to_string())
  );
}
