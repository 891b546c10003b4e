// CLI batch run: rank a CSV file in place through an in-process controller

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::daemon::controller::JobController;
use crate::daemon::events::JobEvent;
use crate::daemon::pacing::{PacingConfig, CLI_BATCH_SIZE};
use crate::lookup::{Credentials, HttpLookupFactory, LookupFactory};
use crate::models::job::{JobState, PollerParams, StartRequest};
use crate::models::rank::{Device, RankRecord, RankValue};
use crate::storage::{CsvDatasetStore, DatasetStore};

/// Flags of `rankflow run`. Anything given here wins over the job file.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// CSV file with a Keyword or Keywords column
    pub csv: Option<PathBuf>,

    /// Domain to look for in the results
    pub target: Option<String>,

    /// JSON job file (csv_file, target_url, api_credentials, location_code, limit, test_mode)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// DataForSEO API login
    #[arg(long, requires = "password", conflicts_with = "test")]
    pub login: Option<String>,

    /// DataForSEO API password
    #[arg(long, requires = "login", conflicts_with = "test")]
    pub password: Option<String>,

    /// Use deterministic offline rankings instead of the API
    #[arg(long)]
    pub test: bool,

    /// Only process the first N keywords
    #[arg(long)]
    pub limit: Option<usize>,

    /// Search location code
    #[arg(long = "location")]
    pub location: Option<u32>,

    /// Search location name, e.g. "Delhi,India"
    #[arg(long = "location-name")]
    pub location_name: Option<String>,

    /// desktop, mobile or tablet [default: desktop]
    #[arg(long)]
    pub device: Option<String>,

    /// Keywords per persisted batch [default: 10]
    #[arg(long = "batch-size")]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct JobCredentials {
    pub login: Option<String>,
    pub password: Option<String>,
}

/// A job described in a JSON file, as accepted by `run --config`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct JobFile {
    pub csv_file: Option<PathBuf>,
    pub target_url: Option<String>,
    pub api_credentials: Option<JobCredentials>,
    pub location_code: Option<u32>,
    pub location_name: Option<String>,
    pub device: Option<String>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub test_mode: bool,
    pub batch_size: Option<usize>,
}

pub fn load_job_file(path: &Path) -> anyhow::Result<JobFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    let job: JobFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse job file {}", path.display()))?;
    Ok(job)
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub csv: PathBuf,
    pub target: String,
    pub login: Option<String>,
    pub password: Option<String>,
    pub test_mode: bool,
    pub limit: Option<usize>,
    pub location_code: Option<u32>,
    pub location_name: Option<String>,
    pub device: Device,
    pub batch_size: usize,
}

impl RunOptions {
    /// Merge flags over an optional job file and validate the result:
    /// `csv_file` and `target_url` are required, and outside test mode so
    /// are both credential halves.
    pub fn resolve(args: &RunArgs, job: Option<JobFile>) -> anyhow::Result<Self> {
        let job = job.unwrap_or_default();
        let credentials = job.api_credentials.unwrap_or_default();

        let mut missing = Vec::new();
        let csv = args.csv.clone().or(job.csv_file);
        let target = args
            .target
            .clone()
            .or(job.target_url)
            .filter(|t| !t.trim().is_empty());
        if csv.is_none() {
            missing.push("csv_file");
        }
        if target.is_none() {
            missing.push("target_url");
        }
        let (Some(csv), Some(target)) = (csv, target) else {
            anyhow::bail!("Missing required fields: {}", missing.join(", "));
        };

        let test_mode = args.test || job.test_mode;
        let login = args.login.clone().or(credentials.login);
        let password = args.password.clone().or(credentials.password);
        if !test_mode && Credentials::from_parts(login.as_deref(), password.as_deref()).is_none()
        {
            anyhow::bail!("API credentials (login and password) are required outside test mode");
        }

        let device = match args.device.as_deref().or(job.device.as_deref()) {
            Some(device) => device.parse()?,
            None => Device::default(),
        };

        Ok(Self {
            csv,
            target,
            login,
            password,
            test_mode,
            limit: args.limit.or(job.limit),
            location_code: args.location.or(job.location_code),
            location_name: args.location_name.clone().or(job.location_name),
            device,
            batch_size: args.batch_size.or(job.batch_size).unwrap_or(CLI_BATCH_SIZE),
        })
    }
}

/// `<csv>.backup` next to the input file.
pub fn backup_path(csv: &Path) -> PathBuf {
    let mut name: OsString = csv
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("dataset.csv"));
    name.push(".backup");
    csv.with_file_name(name)
}

/// Counts printed in the run summary.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ranked: usize,
    pub not_ranked: usize,
    pub unavailable: usize,
}

pub fn summarize(results: &[RankRecord]) -> RunSummary {
    let mut summary = RunSummary::default();
    for record in results {
        match &record.ranking {
            RankValue::Position(_) => summary.ranked += 1,
            RankValue::Label(label) if label == crate::models::rank::NOT_AVAILABLE => {
                summary.unavailable += 1
            }
            RankValue::Label(_) => summary.not_ranked += 1,
        }
    }
    summary
}

/// rankflow run
pub async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let job = match &args.config {
        Some(path) => {
            println!("Loading job from {}", path.display());
            Some(load_job_file(path)?)
        }
        None => None,
    };
    execute(RunOptions::resolve(&args, job)?).await
}

pub async fn execute(options: RunOptions) -> anyhow::Result<()> {
    let config = crate::daemon::load_config(None)?;

    let store = Arc::new(CsvDatasetStore::new());
    let dataset = store
        .load(&options.csv)
        .await
        .with_context(|| format!("Failed to load {}", options.csv.display()))?;

    let credentials =
        Credentials::from_parts(options.login.as_deref(), options.password.as_deref());
    let lookup =
        HttpLookupFactory::from_config(&config).build(credentials.as_ref(), options.test_mode)?;

    let backup = backup_path(&options.csv);
    tokio::fs::copy(&options.csv, &backup)
        .await
        .with_context(|| format!("Failed to write backup {}", backup.display()))?;
    println!("Backup written to {}", backup.display());

    let pacing = if options.test_mode {
        PacingConfig::immediate(options.batch_size)
    } else {
        PacingConfig::cli().with_batch_size(options.batch_size)
    };
    let (event_tx, _) = broadcast::channel::<JobEvent>(config.broadcast_capacity.max(1));
    let controller = JobController::new(store, event_tx, pacing);
    let mut events = controller.subscribe();

    let original_name = options
        .csv
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset.csv".to_string());
    let request = StartRequest {
        target: options.target.clone(),
        location_code: options
            .location_code
            .unwrap_or(config.default_location_code),
        location_name: options.location_name.clone(),
        device: options.device,
        language_code: config.language_code.clone(),
        limit: options.limit,
        dataset_ref: original_name.clone(),
        dataset_path: options.csv.clone(),
        original_name,
    };
    controller.start(request, dataset, lookup)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            result = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if result.is_ok() {
                    println!("Interrupted, saving partial results...");
                    if let Err(e) = controller.cancel(None) {
                        tracing::debug!("Cancel after interrupt: {}", e);
                    }
                }
            }
            event = events.recv() => match event {
                Ok(JobEvent::Started { total, .. }) => {
                    println!("Processing {} keywords for {}", total, options.target);
                }
                Ok(JobEvent::Progress { keyword, processed, total, .. }) => {
                    println!("[{}/{}] {}", processed, total, keyword);
                }
                Ok(JobEvent::BatchPersisted { batch, batches, .. }) => {
                    println!("Saved batch {}/{}", batch, batches);
                }
                Ok(JobEvent::Finished { .. }) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Progress output skipped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    controller.join().await;

    let snapshot = controller.status(&PollerParams::default());
    let job = snapshot.job;
    let summary = summarize(&job.results);
    println!(
        "{:?}: {}/{} keywords, {} ranked, {} not ranked, {} unavailable",
        job.state, job.processed, job.total, summary.ranked, summary.not_ranked, summary.unavailable
    );
    println!("Results written to {}", options.csv.display());

    match job.state {
        JobState::Failed => Err(anyhow::anyhow!(
            "{}",
            job.error.unwrap_or_else(|| "Job failed".to_string())
        )),
        _ => {
            if let Some(error) = job.error {
                eprintln!("Last error: {}", error);
            }
            Ok(())
        }
    }
}
