use std::sync::Arc;

use archival_core::db::{AiDescriptionRepository, AssetVersionRepository, JobgroupRepository, JobgroupResultRepository};
use archival_core::jobgroup::{
    cancel_jobgroup, BatchApiClient, JobgroupAuditLog, JobgroupPoller, JobgroupResultProcessor, JobgroupSubmitter,
    PendingJobgroupBuffer,
};
use archival_core::jobs::batch_status::BatchStatusTracker;
use archival_core::jobs::config::JobConfig;
use archival_core::jobs::dead_letter::DeadLetterQueue;
use archival_core::jobs::metrics::JobMetrics;
use archival_core::jobs::queue::{JobQueue, LEGACY_QUEUE_KEYS};
use archival_core::jobs::worker::WorkerLoop;
use archival_core::jobs::Worker;
use archival_core::pipelines::image_ops::ResolutionBounds;
use archival_core::pipelines::{ArchivistPipeline, JobgroupDelegate, MachinistPipeline};
use archival_core::webhook::WebhookNotifier;
use archival_core::{BlobStore, Config, Database, RedisConfig, RedisPool, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "archival")]
#[command(about = "Digital asset archival job-processing platform")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Set log level (falls back to RUST_LOG)")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP control plane (health/metrics/enqueue/queues).
    Serve,

    /// Run one of the two background workers.
    Worker {
        #[command(subcommand)]
        which: WorkerKind,
    },

    /// Drain the legacy shared-priority queue keys into the namespaced lanes.
    MigrateQueues,

    /// Submit a tenant's accumulated jobgroup-priority jobs as one batch.
    CreateJobgroup {
        tenant: Uuid,
        batch: Uuid,
        /// Submission mode; only "jobgroup" is currently supported.
        mode: String,
    },

    /// List every jobgroup.
    ListJobgroups,

    /// Show one jobgroup in full.
    ShowJobgroup { id: Uuid },

    /// Cancel an in-flight jobgroup.
    CancelJobgroup { id: Uuid },

    /// Print a shell completion script to stdout.
    Completions { shell: Shell },
}

#[derive(Subcommand)]
enum WorkerKind {
    Machinist,
    Archivist,
}

async fn connect_redis(config: &Config) -> Result<RedisPool> {
    let redis_config = RedisConfig {
        url: config.redis.connection_string(),
        use_tls: config.redis.tls,
        password: config.redis.password.clone(),
        ..RedisConfig::default()
    };
    RedisPool::new(redis_config).await.map_err(archival_core::Error::from)
}

async fn require_database(config: &Config) -> Result<Database> {
    let url = config
        .database_url
        .as_ref()
        .ok_or_else(|| archival_core::Error::config("DATABASE_URL is required for this command"))?;
    Database::connect(url, 10).await
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        handle.cancel();
    });
    token
}

async fn run_machinist(config: Config, redis: RedisPool, db: Database) -> Result<()> {
    let job_config = JobConfig::from_env();
    let blob_store = BlobStore::from_env().await;
    let asset_versions = AssetVersionRepository::new(db.pool().clone());
    let resolution_bounds = ResolutionBounds {
        min_width: config.resolution_gates.min_width,
        min_height: config.resolution_gates.min_height,
        max_width: config.resolution_gates.max_width,
        max_height: config.resolution_gates.max_height,
    };

    let pipeline = MachinistPipeline::new(blob_store, asset_versions, resolution_bounds, job_config.sharp_timeout);

    let queue = JobQueue::new(redis.clone());
    let dlq = DeadLetterQueue::new(redis.clone()).with_webhook(config.dlq_webhook_url.clone());
    let metrics = JobMetrics::new();
    let batch_status = BatchStatusTracker::new(redis.clone());
    let shutdown = shutdown_on_ctrl_c();

    let worker = WorkerLoop::new(
        Worker::Machinist,
        queue,
        dlq,
        metrics,
        batch_status,
        job_config,
        Arc::new(pipeline),
        shutdown,
    );

    info!("machinist worker starting");
    worker.run().await;
    Ok(())
}

async fn run_archivist(config: Config, redis: RedisPool, db: Database) -> Result<()> {
    let job_config = JobConfig::from_env();
    let blob_store = BlobStore::from_env().await;
    let ai_descriptions = AiDescriptionRepository::new(db.pool().clone());
    let pending = Arc::new(PendingJobgroupBuffer::new(redis.clone()));

    let pipeline = ArchivistPipeline::new(
        blob_store,
        ai_descriptions,
        config.model_api.base_url.clone(),
        config.model_api.api_key.clone(),
        config.model_api.model.clone(),
        job_config.sharp_timeout,
        Some(pending.clone() as Arc<dyn JobgroupDelegate>),
    );

    let queue = JobQueue::new(redis.clone());
    let dlq = DeadLetterQueue::new(redis.clone()).with_webhook(config.dlq_webhook_url.clone());
    let metrics = JobMetrics::new();
    let batch_status = BatchStatusTracker::new(redis.clone());
    let shutdown = shutdown_on_ctrl_c();

    let worker = WorkerLoop::new(
        Worker::Archivist,
        queue,
        dlq,
        metrics,
        batch_status,
        job_config.clone(),
        Arc::new(pipeline),
        shutdown.clone(),
    );

    let jobgroups = JobgroupRepository::new(db.pool().clone());
    let results = JobgroupResultRepository::new(db.pool().clone());
    let asset_versions = AssetVersionRepository::new(db.pool().clone());
    let client = BatchApiClient::new(config.model_api.base_url.clone(), config.model_api.api_key.clone());
    let audit = JobgroupAuditLog::new(config.audit_dir.clone());
    let ai_descriptions_for_results = AiDescriptionRepository::new(db.pool().clone());
    let results_dlq = DeadLetterQueue::new(redis.clone()).with_webhook(config.dlq_webhook_url.clone());

    let processor = JobgroupResultProcessor::new(
        jobgroups.clone(),
        results,
        ai_descriptions_for_results,
        asset_versions,
        client.clone(),
        audit.clone(),
        results_dlq,
        WebhookNotifier::new(config.dlq_webhook_url.clone()),
    );

    let poller = JobgroupPoller::new(
        redis,
        jobgroups,
        client,
        processor,
        audit,
        job_config.jobgroup_poll_lock_ttl_secs,
        job_config.jobgroup_poll_active_interval,
        job_config.jobgroup_poll_idle_interval,
        WebhookNotifier::new(config.dlq_webhook_url.clone()),
    )
    .with_mock_output_dir(job_config.jobgroup_mock_output_dir.clone().map(std::path::PathBuf::from));

    info!("archivist worker starting (jobgroup poller runs in-process)");
    tokio::join!(worker.run(), poller.run(shutdown));
    Ok(())
}

async fn migrate_queues(redis: RedisPool) -> Result<()> {
    let queue = JobQueue::new(redis);
    for legacy_key in LEGACY_QUEUE_KEYS {
        let migrated = queue.migrate_legacy_queue(legacy_key).await?;
        println!("{}: migrated {} job(s)", legacy_key, migrated);
    }
    Ok(())
}

async fn create_jobgroup(config: Config, redis: RedisPool, db: Database, tenant: Uuid, batch: Uuid, mode: String) -> Result<()> {
    if mode != "jobgroup" {
        return Err(archival_core::Error::validation(format!("unsupported jobgroup mode '{}'", mode)));
    }

    let pending = PendingJobgroupBuffer::new(redis.clone());
    let jobs = pending.drain(tenant).await?;
    let jobs: Vec<_> = jobs.into_iter().filter(|job| job.batch_id == Some(batch)).collect();

    if jobs.is_empty() {
        return Err(archival_core::Error::validation(format!(
            "no pending jobgroup jobs for tenant {} batch {}",
            tenant, batch
        )));
    }

    let repo = JobgroupRepository::new(db.pool().clone());
    let client = BatchApiClient::new(config.model_api.base_url.clone(), config.model_api.api_key.clone());
    let audit = JobgroupAuditLog::new(config.audit_dir.clone());
    let webhook = WebhookNotifier::new(config.dlq_webhook_url.clone());
    let submitter = JobgroupSubmitter::new(repo.clone(), client.clone(), audit.clone(), webhook.clone());

    let outcome = submitter.submit(jobs).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "jobgroup_id": outcome.jobgroup_id,
            "external_jobgroup_id": outcome.external_jobgroup_id,
            "input_file_id": outcome.input_file_id,
            "status": outcome.status,
            "request_count": outcome.request_count,
        }))
        .unwrap()
    );

    // §4.8 submission step 7: trigger one poll cycle immediately so this
    // jobgroup doesn't sit idle until the long-running worker's next tick.
    let job_config = JobConfig::from_env();
    let results = JobgroupResultRepository::new(db.pool().clone());
    let ai_descriptions = AiDescriptionRepository::new(db.pool().clone());
    let asset_versions = AssetVersionRepository::new(db.pool().clone());
    let dlq = DeadLetterQueue::new(redis.clone()).with_webhook(config.dlq_webhook_url.clone());
    let processor = JobgroupResultProcessor::new(
        repo.clone(),
        results,
        ai_descriptions,
        asset_versions,
        client.clone(),
        audit.clone(),
        dlq,
        webhook.clone(),
    );
    let poller = JobgroupPoller::new(
        redis,
        repo,
        client,
        processor,
        audit,
        job_config.jobgroup_poll_lock_ttl_secs,
        job_config.jobgroup_poll_active_interval,
        job_config.jobgroup_poll_idle_interval,
        webhook,
    );
    if let Err(e) = poller.run_once().await {
        tracing::warn!(error = %e, "initial post-submission poll cycle failed, will be retried by the regular poller");
    }

    Ok(())
}

async fn list_jobgroups(db: Database) -> Result<()> {
    use prettytable::{row, Table};

    let repo = JobgroupRepository::new(db.pool().clone());
    let jobgroups = repo.list().await?;

    let mut table = Table::new();
    table.add_row(row!["ID", "TENANT", "STATUS", "REQUESTS", "CREATED"]);
    for jobgroup in &jobgroups {
        table.add_row(row![
            jobgroup.id,
            jobgroup.tenant_id,
            jobgroup.status,
            jobgroup.request_count,
            jobgroup.created_at.to_rfc3339(),
        ]);
    }
    table.printstd();
    Ok(())
}

async fn show_jobgroup(db: Database, id: Uuid) -> Result<()> {
    let repo = JobgroupRepository::new(db.pool().clone());
    match repo.find(id).await? {
        Some(jobgroup) => {
            println!("{}", serde_json::to_string_pretty(&jobgroup).unwrap());
            Ok(())
        }
        None => Err(archival_core::Error::not_found(format!("jobgroup {} not found", id))),
    }
}

async fn do_cancel_jobgroup(config: Config, db: Database, id: Uuid) -> Result<()> {
    let repo = JobgroupRepository::new(db.pool().clone());
    let client = BatchApiClient::new(config.model_api.base_url, config.model_api.api_key);
    let audit = JobgroupAuditLog::new(config.audit_dir);
    cancel_jobgroup(&repo, &client, &audit, id).await?;
    println!("jobgroup {} cancelled", id);
    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let log_level = cli.log_level.clone().unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "archival", &mut std::io::stdout());
        return Ok(());
    }

    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve => archival_api::run(config).await,
        Commands::Worker { which } => {
            let redis = connect_redis(&config).await?;
            let db = require_database(&config).await?;
            match which {
                WorkerKind::Machinist => run_machinist(config, redis, db).await,
                WorkerKind::Archivist => run_archivist(config, redis, db).await,
            }
        }
        Commands::MigrateQueues => {
            let redis = connect_redis(&config).await?;
            migrate_queues(redis).await
        }
        Commands::CreateJobgroup { tenant, batch, mode } => {
            let redis = connect_redis(&config).await?;
            let db = require_database(&config).await?;
            create_jobgroup(config, redis, db, tenant, batch, mode).await
        }
        Commands::ListJobgroups => {
            let db = require_database(&config).await?;
            list_jobgroups(db).await
        }
        Commands::ShowJobgroup { id } => {
            let db = require_database(&config).await?;
            show_jobgroup(db, id).await
        }
        Commands::CancelJobgroup { id } => {
            let db = require_database(&config).await?;
            do_cancel_jobgroup(config, db, id).await
        }
        Commands::Completions { .. } => unreachable!("handled before Config::from_env"),
    }
}
