use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use diesel::{Connection, SqliteConnection};

use jobstats_store::JobstatsHandler;
use jobstats_store::core::jobstats_config::{self, JobstatsConfig};
use jobstats_store::core::payload::{DecodedStats, decode_js1_payload, encode_js1_payload};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
  /// Configuration file (defaults to the per-user configuration)
  #[arg(short, long)]
  config: Option<PathBuf>,
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Write a configuration file with default settings
  Init { path: PathBuf },
  /// Print the stored jobstats of a job
  Get {
    #[arg(long)]
    cluster: String,
    #[arg(long)]
    jobid: i64,
  },
  /// Store jobstats for a job
  Save {
    #[arg(long)]
    cluster: String,
    #[arg(long)]
    jobid: i64,
    /// Raw payload; read from stdin when omitted
    #[arg(long)]
    stats: Option<String>,
    /// Scheduler database holding the `<cluster>_job_table`
    #[arg(long)]
    slurm_db: Option<String>,
  },
  /// Encode a JSON stats file as a JS1 payload
  Encode { file: PathBuf },
  /// Decode a JS1 payload to JSON
  Decode { payload: String },
}

pub fn main() -> ExitCode {
  let _ = env_logger::try_init();
  let cli = Cli::parse();

  match run(cli) {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(e) => {
      eprintln!("❌ {:#}", e);
      ExitCode::FAILURE
    }
  }
}

fn load_config(path: &Option<PathBuf>) -> Result<JobstatsConfig> {
  let config = match path {
    Some(path) => jobstats_config::get_jobstats_config(path)?,
    None => jobstats_config::get_jobstats_config_global()?,
  };
  Ok(config)
}

fn run(cli: Cli) -> Result<bool> {
  match cli.command {
    Commands::Init { path } => {
      jobstats_config::init_jobstats_config(&path)?;
      println!("✅ Configuration written to {}", path.display());
      Ok(true)
    }
    Commands::Get { cluster, jobid } => {
      let config = load_config(&cli.config)?;
      let mut handler = JobstatsHandler::new(&config.external_db);
      match handler.get_jobstats(&cluster, jobid) {
        Some(stats) => {
          println!("{}", stats);
          Ok(true)
        }
        None => Ok(false),
      }
    }
    Commands::Save {
      cluster,
      jobid,
      stats,
      slurm_db,
    } => {
      let config = load_config(&cli.config)?;
      let stats = match stats {
        Some(stats) => stats,
        None => {
          let mut buf = String::new();
          std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stats from stdin")?;
          buf.trim().to_string()
        }
      };
      let mut slurm_conn = match slurm_db {
        Some(url) => Some(
          SqliteConnection::establish(&url)
            .with_context(|| format!("Failed to open Slurm database {}", url))?,
        ),
        None => None,
      };

      let mut handler = JobstatsHandler::new(&config.external_db);
      let errors = handler.save_jobstats(&cluster, jobid, &stats, slurm_conn.as_mut());
      for error in &errors {
        eprintln!("❌ {}", error);
      }
      if errors.is_empty() {
        println!("✅ Jobstats of {}/{} saved.", cluster, jobid);
      }
      Ok(errors.is_empty())
    }
    Commands::Encode { file } => {
      let text = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
      let stats: DecodedStats = serde_json::from_str(&text).context("Invalid stats JSON")?;
      println!("{}", encode_js1_payload(&stats)?);
      Ok(true)
    }
    Commands::Decode { payload } => {
      let Some(stats) = decode_js1_payload(&payload) else {
        bail!("Payload could not be decoded");
      };
      println!("{}", serde_json::to_string_pretty(&stats)?);
      Ok(true)
    }
  }
}
