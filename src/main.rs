use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use medsupply::app::ports::{SourcePort, StoreConnector};
use medsupply::config::{Config, SourceMode, StoreBackend};
use medsupply::error::{RunError, Step};
use medsupply::infra::file_source::{read_payload, FileSource};
use medsupply::infra::http_client::ReqwestHttp;
use medsupply::infra::http_source::HttpSource;
use medsupply::infra::sqlite_store::SqliteConnector;
use medsupply::metrics::{init_metrics, TracingSink};
use medsupply::pipeline::snapshot::SnapshotWriter;
use medsupply::pipeline::{decode, translate, Pipeline};
use medsupply::storage::SnapshotStore;
use medsupply::{calendar, logging, scheduler};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "medsupply")]
#[command(about = "Ingests the published drug shipment status workbook into a snapshot store")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = medsupply::constants::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one workbook now
    Run {
        /// Publication date to fetch (defaults to the previous business day)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Ingest this file instead of fetching one
        #[arg(long, conflicts_with = "date")]
        file: Option<PathBuf>,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ingest on a fixed interval until interrupted
    Schedule,
    /// Show row count and commit stamps of the store
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Check a workbook's column labels against the ingested columns
    Columns {
        #[arg(long)]
        file: PathBuf,
    },
}

fn build_source(config: &Config) -> anyhow::Result<Arc<dyn SourcePort>> {
    let source = &config.source;
    Ok(match source.mode {
        SourceMode::File => Arc::new(FileSource::new(&source.data_dir, &source.file_suffix)),
        SourceMode::Http => {
            let client = ReqwestHttp::new(Duration::from_secs(source.timeout_secs))
                .map_err(|e| anyhow::anyhow!("building HTTP client: {e:?}"))?;
            Arc::new(HttpSource::new(
                Arc::new(client),
                &source.base_url,
                &source.file_suffix,
                source.max_retries,
                Duration::from_millis(source.retry_delay_ms),
            ))
        }
    })
}

async fn build_connector(config: &Config) -> anyhow::Result<Arc<dyn StoreConnector>> {
    match config.store.backend {
        StoreBackend::Sqlite => Ok(Arc::new(SqliteConnector::new(
            &config.store.path,
            &config.store.table,
        ))),
        #[cfg(feature = "db")]
        StoreBackend::Libsql => {
            let url = std::env::var("LIBSQL_URL").context("LIBSQL_URL environment variable not set")?;
            let token = std::env::var("LIBSQL_AUTH_TOKEN")
                .context("LIBSQL_AUTH_TOKEN environment variable not set")?;
            let connector =
                medsupply::infra::libsql_store::LibsqlConnector::new(&url, &token, &config.store.table)
                    .await?;
            Ok(Arc::new(connector))
        }
        #[cfg(not(feature = "db"))]
        StoreBackend::Libsql => bail!("the libsql store backend requires the `db` feature"),
    }
}

async fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    let writer = SnapshotWriter::new(
        config.store.batch_size,
        chrono::Duration::seconds(config.store.lease_ttl_secs),
        format!("medsupply-{}", Uuid::new_v4()),
    );
    Ok(Pipeline::new(
        build_source(config)?,
        build_connector(config).await?,
        Arc::new(TracingSink),
        writer,
        config.source.header_offset,
    ))
}

fn target_for(config: &Config, date: Option<NaiveDate>) -> medsupply::error::Result<NaiveDate> {
    match date {
        Some(d) => Ok(d),
        None => calendar::target_date(
            Utc::now(),
            config.schedule.utc_offset_hours,
            &config.source.holiday_set(),
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let _guards = logging::init_logging(&config.logging)?;

    match cli.command {
        Commands::Run { date, file, json } => {
            let pipeline = build_pipeline(&config).await?;
            let result = match file {
                Some(path) => match read_payload(&path).await {
                    Ok(payload) => pipeline.run_payload(payload).await,
                    Err(e) => Err(pipeline.fetch_failed(path.display().to_string(), e)),
                },
                None => {
                    let target = target_for(&config, date)?;
                    info!(%target, "running ingestion");
                    pipeline.run(target).await
                }
            };
            match result {
                Ok(report) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        println!("{}", report.status_line());
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    error!("Run failed: {}", e);
                    eprintln!("run failed: {e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Schedule => {
            if let Some(port) = config.metrics.port {
                init_metrics(port);
            }
            let pipeline = Arc::new(build_pipeline(&config).await?);
            let every = Duration::from_secs(config.schedule.interval_secs);
            let job = || {
                let pipeline = Arc::clone(&pipeline);
                let config = config.clone();
                async move {
                    let target = target_for(&config, None)
                        .map_err(|e| RunError::new("schedule", Step::Fetch, e))?;
                    pipeline.run(target).await
                }
            };
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            };
            let stats = scheduler::run_every(every, &config.schedule.label, job, shutdown).await;
            println!("{} runs, {} failed", stats.runs, stats.failures);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status { json } => {
            let connector = build_connector(&config).await?;
            let mut session = connector.connect().await?;
            let stats = session.stats().await;
            session.close().await?;
            let stats = stats?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("rows: {}", stats.rows);
                for stamp in &stats.stamps {
                    println!("updated_at: {}", stamp.to_rfc3339());
                }
                if stats.stamps.len() > 1 {
                    println!("warning: mixed commit stamps; the last run did not finish its cleanup");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Columns { file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let sheet = decode::decode(&bytes, config.source.header_offset)?;
            let check = translate::check_labels(&sheet.labels);
            println!("sheet: {} ({} data rows)", sheet.sheet_name, sheet.rows.len());
            for label in &check.missing {
                println!("missing:  {}", label.escape_debug());
            }
            for label in &check.unmapped {
                println!("unmapped: {}", label.escape_debug());
            }
            if check.is_complete() {
                println!("all {} columns present", translate::COLUMNS.len());
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
