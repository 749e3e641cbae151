use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Args;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tripflow::{
    discover_sources, BulkLoader, DatabaseConfig, IngestConfig, IngestError, LoadSummary,
    MemoryStore, RejectLog, RejectSink, RejectedRow, SeaOrmStore, TripStore,
};

use crate::db::database_config;

const DEFAULT_SOURCE_DIR: &str = "data/cleaned";

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// CSV file to load
    pub csv_path: Option<PathBuf>,
    /// Load every CSV file of the source directory
    #[clap(long, conflicts_with = "csv_path")]
    pub all_cleaned: bool,
    /// Source directory; implies --all-cleaned (default: data/cleaned)
    #[clap(long, conflicts_with = "csv_path")]
    pub dir: Option<PathBuf>,
    /// Rows per read chunk, committed as one transaction
    #[clap(long)]
    pub chunksize: Option<usize>,
    /// Rows per physical insert statement
    #[clap(long)]
    pub batch_size: Option<usize>,
    /// YAML file with ingest settings
    #[clap(short, long)]
    pub config: Option<PathBuf>,
    /// SQLite path or database URL; defaults to the environment
    #[clap(short, long)]
    pub database: Option<String>,
    /// Directory for the excluded-records reports
    #[clap(long, default_value = "data/logs")]
    pub log_dir: PathBuf,
    /// Append to existing reports instead of replacing them
    #[clap(long)]
    pub append_log: bool,
    #[clap(long)]
    pub no_outlier_filter: bool,
    /// Sources loaded concurrently in directory mode
    #[clap(short, long, default_value = "1")]
    pub jobs: usize,
    /// Run the pipeline against an in-memory store
    #[clap(long)]
    pub dry_run: bool,
}

impl IngestArgs {
    fn ingest_config(&self) -> Result<IngestConfig> {
        let mut config = match &self.config {
            Some(path) => IngestConfig::from_yaml_file(path)?,
            None => IngestConfig::default(),
        };
        if let Some(chunk_size) = self.chunksize {
            config.chunk_size = chunk_size;
        }
        if let Some(batch_size) = self.batch_size {
            config.insert_batch_size = batch_size;
        }
        if self.no_outlier_filter {
            config.outliers.enabled = false;
        }
        config.validate()?;
        Ok(config)
    }

    fn sources(&self) -> Result<Vec<PathBuf>> {
        if self.all_cleaned || self.dir.is_some() {
            let dir = self
                .dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE_DIR));
            let sources = discover_sources(&dir)?;
            if sources.is_empty() {
                bail!("no CSV files found in {}", dir.display());
            }
            return Ok(sources);
        }
        match &self.csv_path {
            Some(path) => Ok(vec![path.clone()]),
            None => bail!("provide a CSV path, --all-cleaned or --dir"),
        }
    }
}

pub fn reject_log_path(log_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source".to_string());
    log_dir.join(format!("{}_excluded_records.log", stem))
}

struct SourceJob {
    source: PathBuf,
    config: IngestConfig,
    database: DatabaseConfig,
    log_path: PathBuf,
    append_log: bool,
    dry_run: bool,
    cancel: CancellationToken,
}

struct SourceOutcome {
    summary: LoadSummary,
    result: std::result::Result<(), IngestError>,
}

pub async fn run(args: IngestArgs, cancel: CancellationToken) -> Result<()> {
    let config = args.ingest_config()?;
    let sources = args.sources()?;
    let database = database_config(args.database.as_deref());
    let jobs = args.jobs.max(1);
    if args.dry_run {
        info!("Dry run: rows are loaded into memory only");
    }
    info!("Ingesting {} source(s) with {} job(s)", sources.len(), jobs);

    let total = sources.len();
    let mut queue = sources.into_iter();
    let mut tasks = JoinSet::new();
    let mut failures = 0;

    loop {
        while tasks.len() < jobs {
            let Some(source) = queue.next() else { break };
            let job = SourceJob {
                log_path: reject_log_path(&args.log_dir, &source),
                source,
                config: config.clone(),
                database: database.clone(),
                append_log: args.append_log,
                dry_run: args.dry_run,
                cancel: cancel.clone(),
            };
            tasks.spawn(load_source(job));
        }

        let Some(joined) = tasks.join_next().await else { break };
        match joined {
            Ok(outcome) => {
                println!("{}", outcome.summary);
                if let Err(err) = outcome.result {
                    error!("{}", err);
                    failures += 1;
                }
            }
            Err(err) => {
                error!("Load task failed: {}", err);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} source(s) failed to load", failures, total);
    }
    Ok(())
}

async fn load_source(job: SourceJob) -> SourceOutcome {
    let outcome = if job.dry_run {
        run_loader(MemoryStore::new(), Vec::<RejectedRow>::new(), &job).await
    } else {
        match open_sinks(&job).await {
            Ok((store, rejects)) => run_loader(store, rejects, &job).await,
            Err(err) => SourceOutcome {
                summary: LoadSummary::new(&job.source),
                result: Err(err),
            },
        }
    };
    if outcome.result.is_ok() && !job.dry_run {
        info!("Excluded records written to {}", job.log_path.display());
    }
    outcome
}

async fn open_sinks(job: &SourceJob) -> std::result::Result<(SeaOrmStore, RejectLog), IngestError> {
    if !job.source.exists() {
        return Err(IngestError::SourceNotFound(job.source.clone()));
    }
    let store = SeaOrmStore::connect(&job.database)
        .await
        .map_err(IngestError::StorageUnavailable)?;
    let rejects = if job.append_log {
        RejectLog::append_to(&job.log_path)?
    } else {
        RejectLog::create(&job.log_path)?
    };
    Ok((store, rejects))
}

async fn run_loader<S, K>(store: S, rejects: K, job: &SourceJob) -> SourceOutcome
where
    S: TripStore,
    K: RejectSink,
{
    let mut loader =
        BulkLoader::new(job.config.clone(), store, rejects).with_cancellation(job.cancel.clone());
    let result = loader.load(&job.source).await.map(|_| ());
    if let Err(IngestError::Cancelled { offset }) = &result {
        warn!(
            "{} cancelled; resume from row {}",
            job.source.display(),
            offset
        );
    }
    SourceOutcome {
        summary: loader.summary().clone(),
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> IngestArgs {
        IngestArgs {
            csv_path: None,
            all_cleaned: false,
            dir: None,
            chunksize: None,
            batch_size: None,
            config: None,
            database: None,
            log_dir: PathBuf::from("data/logs"),
            append_log: false,
            no_outlier_filter: false,
            jobs: 1,
            dry_run: false,
        }
    }

    #[test]
    fn reject_logs_are_named_after_the_source() {
        assert_eq!(
            reject_log_path(Path::new("data/logs"), Path::new("data/cleaned/jan.csv")),
            PathBuf::from("data/logs/jan_excluded_records.log")
        );
    }

    #[test]
    fn flags_override_config_defaults() {
        let mut args = args();
        args.chunksize = Some(10);
        args.batch_size = Some(5);
        args.no_outlier_filter = true;
        let config = args.ingest_config().unwrap();
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.insert_batch_size, 5);
        assert!(!config.outliers.enabled);

        args.chunksize = Some(0);
        assert!(args.ingest_config().is_err());
    }

    #[test]
    fn a_source_is_required() {
        assert!(args().sources().is_err());

        let mut args = args();
        args.csv_path = Some(PathBuf::from("trips.csv"));
        assert_eq!(args.sources().unwrap(), vec![PathBuf::from("trips.csv")]);
    }

    #[tokio::test]
    async fn missing_source_fails_the_run() {
        let mut args = args();
        args.csv_path = Some(PathBuf::from("definitely/not/here.csv"));
        args.dry_run = true;
        assert!(run(args, CancellationToken::new()).await.is_err());
    }
}
