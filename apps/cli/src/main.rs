//! sluice - CSV import strategy benchmark
//!
//! Picks one strategy (or all of them), runs it through the benchmark
//! harness against the configured store, and prints one summary line per run.

mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sluice_loader::store::{MemoryStore, MemoryStoreOptions, PgStore, Store};
use sluice_loader::{BenchmarkSample, Harness, ImportOptions, StrategyKind};

use crate::config::Config;

#[derive(Parser)]
#[command(
    name = "sluice",
    about = "Benchmark CSV import strategies",
    version,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Benchmark a single strategy.
    Run {
        /// Strategy name (see `sluice strategies`).
        strategy: StrategyKind,
        #[command(flatten)]
        target: Target,
        /// Keep existing rows instead of truncating first.
        #[arg(long)]
        no_truncate: bool,
    },

    /// Benchmark every strategy on the same file, truncating before each.
    Compare {
        #[command(flatten)]
        target: Target,
    },

    /// List the available strategies.
    Strategies,
}

#[derive(Args)]
struct Target {
    #[command(flatten)]
    source: Source,
    /// Destination store.
    #[arg(long, value_enum, default_value_t = StoreKind::Postgres)]
    store: StoreKind,
    /// Records per flush (defaults to import.batch_size).
    #[arg(long)]
    batch_size: Option<usize>,
    /// Workers for the partitioned strategy (defaults to import.workers).
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Source {
    /// CSV file to import.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Preset size; resolves to customers-<N>.csv in import.data_directory.
    #[arg(long)]
    size: Option<u64>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Postgres,
    Memory,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let _logging_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Strategies => {
            for kind in StrategyKind::ALL {
                println!("{:<24} {}", kind.as_str(), kind.description());
            }
            Ok(())
        }
        Commands::Run {
            strategy,
            target,
            no_truncate,
        } => {
            let session = Session::open(&config, &target)?;
            let sample = session.bench(strategy, !no_truncate).await?;
            if let Some(failure) = &sample.failure {
                anyhow::bail!("{strategy} failed: {failure}");
            }
            Ok(())
        }
        Commands::Compare { target } => {
            let session = Session::open(&config, &target)?;
            let mut failed = 0;
            for kind in StrategyKind::ALL {
                if !session.bench(kind, true).await?.succeeded() {
                    failed += 1;
                }
            }
            tracing::info!(
                strategies = StrategyKind::ALL.len(),
                failed,
                "Comparison finished"
            );
            Ok(())
        }
    }
}

/// One store, one input file and the import options shared by every run.
struct Session {
    harness: Harness,
    path: PathBuf,
    options: ImportOptions,
}

impl Session {
    fn open(config: &Config, target: &Target) -> Result<Self> {
        let path = match (&target.source.file, target.source.size) {
            (Some(file), _) => file.clone(),
            (None, Some(size)) => config.preset_path(size),
            (None, None) => anyhow::bail!("either --file or --size is required"),
        };
        if !path.is_file() {
            anyhow::bail!("input file {} does not exist", path.display());
        }

        let store: Arc<dyn Store> = match target.store {
            StoreKind::Postgres => Arc::new(
                PgStore::new(config.store_options())
                    .context("Failed to parse database.url")?,
            ),
            StoreKind::Memory => Arc::new(MemoryStore::with_options(MemoryStoreOptions {
                local_file_load: config.database.local_file_load,
                ..MemoryStoreOptions::default()
            })),
        };

        let mut options = config.import_options();
        if let Some(batch_size) = target.batch_size {
            options.batch_size = batch_size;
        }
        if let Some(workers) = target.workers {
            options.workers = workers;
        }

        tracing::info!(
            store = store.name(),
            path = %path.display(),
            batch_size = options.batch_size,
            workers = options.workers,
            "Benchmark session ready"
        );

        Ok(Self {
            harness: Harness::new(store),
            path,
            options,
        })
    }

    async fn bench(&self, kind: StrategyKind, truncate: bool) -> Result<BenchmarkSample> {
        let importer = kind
            .build(&self.options)
            .with_context(|| format!("Failed to build strategy {kind}"))?;

        if truncate {
            let mut conn = self
                .harness
                .store()
                .connect()
                .await
                .context("Failed to connect to the store")?;
            conn.truncate()
                .await
                .context("Failed to truncate the destination table")?;
        }

        let sample = self
            .harness
            .run(importer.as_ref(), &self.path)
            .await
            .with_context(|| format!("Failed to benchmark {kind}"))?;

        println!("{:<24} {sample}", kind.as_str());
        if let Some(failure) = &sample.failure {
            println!("{:<24} FAILED: {failure}", "");
        }
        Ok(sample)
    }
}
