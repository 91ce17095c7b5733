use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pricing_core::storage::SqliteStorage;
use pricing_core::{NormalizedPricingFilter, OrderBy, PricingModel, Provider, SortDirection};
use pricing_etl::config::Config;
use pricing_etl::{
    logging, observability, Job, JobConfiguration, JobStatus, JobType, NormalizationPipeline,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pricing-etl")]
#[command(about = "Normalize AWS and Azure retail pricing into one canonical model")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a normalization job over the raw pricing tables
    Normalize {
        #[arg(long, value_enum, default_value_t = JobKind::Full)]
        job: JobKind,
        /// Providers for a full job (comma-separated). Available: aws, azure
        #[arg(long)]
        providers: Option<String>,
        /// Vendor regions to include (comma-separated)
        #[arg(long)]
        regions: Option<String>,
        /// Vendor service codes to include (comma-separated)
        #[arg(long)]
        services: Option<String>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        workers: Option<usize>,
        /// Delete all normalized pricing before running
        #[arg(long)]
        clear_existing: bool,
        /// Normalize and count without persisting
        #[arg(long)]
        dry_run: bool,
    },
    /// Query normalized pricing, printed as JSON lines
    Query {
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        family: Option<String>,
        #[arg(long)]
        service_type: Option<String>,
        /// Canonical region code
        #[arg(long)]
        region: Option<String>,
        /// on_demand, reserved_1yr, reserved_3yr, spot or savings_plan
        #[arg(long)]
        pricing_model: Option<String>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
        #[arg(long)]
        vcpu: Option<u32>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, value_enum, default_value_t = SortKey::Price)]
        order_by: SortKey,
        #[arg(long)]
        desc: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum JobKind {
    Aws,
    Azure,
    Full,
}

impl From<JobKind> for JobType {
    fn from(kind: JobKind) -> Self {
        match kind {
            JobKind::Aws => JobType::AwsNormalization,
            JobKind::Azure => JobType::AzureNormalization,
            JobKind::Full => JobType::FullNormalization,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortKey {
    Price,
    Name,
    ServiceType,
    Region,
    RawId,
}

impl From<SortKey> for OrderBy {
    fn from(key: SortKey) -> Self {
        match key {
            SortKey::Price => OrderBy::PricePerUnit,
            SortKey::Name => OrderBy::ResourceName,
            SortKey::ServiceType => OrderBy::ServiceType,
            SortKey::Region => OrderBy::NormalizedRegion,
            SortKey::RawId => OrderBy::SourceRawId,
        }
    }
}

fn split_list(list: Option<String>) -> Vec<String> {
    list.map(|l| {
        l.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn print_progress(job: &Job) {
    let p = &job.progress;
    println!(
        "   [{}] {}/{} processed, {} normalized, {} skipped, {} errors ({:.0} rec/s)",
        p.current_stage,
        p.processed_records,
        p.total_records,
        p.normalized_records,
        p.skipped_records,
        p.error_records,
        p.rate
    );
}

async fn run_normalize(
    pipeline: &NormalizationPipeline,
    job_type: JobType,
    configuration: JobConfiguration,
) -> Result<()> {
    let job = pipeline.start_job(job_type, configuration).await?;
    println!("🔄 Started {} job {}", job.job_type, job.id);

    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    let waiter = pipeline.wait_for_job(&job.id);
    tokio::pin!(waiter);

    let finished = loop {
        tokio::select! {
            done = &mut waiter => break done?,
            _ = tokio::signal::ctrl_c() => {
                warn!(job_id = %job.id, "Interrupt received, cancelling job");
                if let Err(e) = pipeline.cancel_job(&job.id).await {
                    warn!(error = %e, "Cancel request failed");
                }
            }
            _ = ticker.tick() => {
                if let Some(current) = pipeline.get_job(&job.id).await {
                    print_progress(&current);
                }
            }
        }
    };

    print_progress(&finished);
    match finished.status {
        JobStatus::Completed => println!("✅ Job {} completed", finished.id),
        JobStatus::Cancelled => println!("⚠️  Job {} cancelled", finished.id),
        status => {
            let reason = finished.error.unwrap_or_else(|| "unknown error".to_string());
            bail!("job {} ended {}: {}", finished.id, status, reason);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().context("loading configuration")?;
    let _log_guard = logging::init_logging(&config.logging.dir, config.logging.filter.as_deref());
    if let Some(addr) = &config.metrics.listen_addr {
        observability::init_metrics(addr);
    }

    let storage = SqliteStorage::open(&config.database.path)
        .with_context(|| format!("opening database {}", config.database.path.display()))?;
    info!(path = %config.database.path.display(), "Database opened");
    let pipeline = NormalizationPipeline::from_storage(Arc::new(storage), config.pipeline.clone());

    match cli.command {
        Commands::Normalize {
            job,
            providers,
            regions,
            services,
            batch_size,
            workers,
            clear_existing,
            dry_run,
        } => {
            let providers = split_list(providers)
                .iter()
                .map(|p| p.parse::<Provider>())
                .collect::<Result<Vec<_>, _>>()?;
            let configuration = JobConfiguration {
                providers,
                regions: split_list(regions),
                services: split_list(services),
                batch_size,
                concurrent_workers: workers,
                clear_existing,
                dry_run,
            };
            run_normalize(&pipeline, job.into(), configuration).await?;
        }
        Commands::Query {
            provider,
            category,
            family,
            service_type,
            region,
            pricing_model,
            currency,
            min_price,
            max_price,
            vcpu,
            limit,
            offset,
            order_by,
            desc,
        } => {
            let filter = NormalizedPricingFilter {
                provider: provider.map(|p| p.parse::<Provider>()).transpose()?,
                service_category: category,
                service_family: family,
                service_type,
                normalized_region: region,
                pricing_model: pricing_model.map(|m| m.parse::<PricingModel>()).transpose()?,
                currency,
                min_price,
                max_price,
                vcpu,
                limit: Some(limit),
                offset,
                order_by: order_by.into(),
                direction: if desc {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                },
            };
            let total = pipeline.count_normalized(&filter).await?;
            for record in pipeline.query_normalized(&filter).await? {
                println!("{}", serde_json::to_string(&record)?);
            }
            info!(total, limit, offset, "Query finished");
        }
    }
    Ok(())
}
