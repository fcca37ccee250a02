//! Creez Tasks CLI
//!
//! Submits image/video generations, polls their status with overtime
//! detection, and manages the task schema.

use anyhow::Result;
use clap::{Parser, Subcommand};
use creez_tasks::billing::PgLedger;
use creez_tasks::db::{connect, pool_size_for, run_migrations, tasks};
use creez_tasks::provider::{
    MediaRef, DEFAULT_ASPECT_RATIO, DEFAULT_IMAGE_MODEL, DEFAULT_VIDEO_DURATION,
    DEFAULT_VIDEO_MODEL,
};
use creez_tasks::storage::ArtifactUploader;
use creez_tasks::worker::DrainReport;
use creez_tasks::{
    AppConfig, GenerationRequest, GenerationWorker, ImageRequest, PgTaskStore, Poller, Scheduler,
    TaskKind, TaskLauncher, TaskStore, VideoRequest, WorkerConfig,
};
use std::sync::Arc;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "creez-tasks")]
#[command(about = "Generate images and videos as background tasks and poll their status")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the task and billing schema
    Migrate,

    /// Submit an image generation and wait for it to finish
    Image {
        /// Prompt text
        #[arg(short, long)]
        prompt: String,

        #[arg(short, long, default_value = DEFAULT_IMAGE_MODEL)]
        model: String,

        #[arg(short, long, default_value = DEFAULT_ASPECT_RATIO)]
        aspect_ratio: String,

        /// Reference image URL (repeatable)
        #[arg(short, long)]
        reference: Vec<String>,

        /// Bill this user
        #[arg(short, long)]
        user_id: Option<String>,

        /// Seconds to wait for the generation before exiting
        #[arg(long, default_value = "3900")]
        drain_timeout: u64,
    },

    /// Submit a video generation and wait for it to finish
    Video {
        /// Prompt text
        #[arg(short, long)]
        prompt: String,

        #[arg(short, long, default_value = DEFAULT_VIDEO_MODEL)]
        model: String,

        /// First frame URL, then optional last frame URL
        #[arg(short, long)]
        frame: Vec<String>,

        /// Duration in seconds
        #[arg(short, long, default_value_t = DEFAULT_VIDEO_DURATION)]
        duration: u32,

        #[arg(short, long, default_value = DEFAULT_ASPECT_RATIO)]
        aspect_ratio: String,

        #[arg(long)]
        generate_audio: bool,

        /// Bill this user
        #[arg(short, long)]
        user_id: Option<String>,

        /// Seconds to wait for the generation before exiting
        #[arg(long, default_value = "3900")]
        drain_timeout: u64,
    },

    /// Show task status, marking stale tasks as overtime
    Poll {
        /// image or video
        #[arg(short, long)]
        kind: TaskKind,

        /// Overtime threshold (default: 10 for images, 30 for videos)
        #[arg(short, long)]
        timeout_minutes: Option<u64>,

        /// Task ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Count tasks per status
    Status {
        /// image or video
        #[arg(short, long)]
        kind: TaskKind,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load .env file if present
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();

    let pool = connect(
        config.database_url()?,
        pool_size_for(WorkerConfig::default().max_concurrency),
    )
    .await?;

    match cli.command {
        Commands::Migrate => {
            run_migrations(&pool).await?;
            println!("Migrations applied");
        }

        Commands::Image {
            prompt,
            model,
            aspect_ratio,
            reference,
            user_id,
            drain_timeout,
        } => {
            let mut request = ImageRequest::new(prompt);
            request.model = model;
            request.aspect_ratio = aspect_ratio;
            request.reference_images = reference.into_iter().map(MediaRef::Url).collect();
            request.context.user_id = user_id;

            let worker_config = WorkerConfig::builder()
                .drain_timeout_secs(drain_timeout)
                .build();
            generate(
                &config,
                pool,
                worker_config,
                GenerationRequest::Image(request),
            )
            .await?;
        }

        Commands::Video {
            prompt,
            model,
            frame,
            duration,
            aspect_ratio,
            generate_audio,
            user_id,
            drain_timeout,
        } => {
            let mut request = VideoRequest::new(prompt);
            request.model = model;
            request.frames = frame.into_iter().map(MediaRef::Url).collect();
            request.duration = duration;
            request.aspect_ratio = aspect_ratio;
            request.generate_audio = generate_audio;
            request.context.user_id = user_id;

            let worker_config = WorkerConfig::builder()
                .drain_timeout_secs(drain_timeout)
                .build();
            generate(
                &config,
                pool,
                worker_config,
                GenerationRequest::Video(request),
            )
            .await?;
        }

        Commands::Poll {
            kind,
            timeout_minutes,
            ids,
        } => {
            let mut builder = WorkerConfig::builder();
            if let Some(minutes) = timeout_minutes {
                builder = builder.timeout_minutes(kind, minutes);
            }
            let timeout = builder.build().timeout_for(kind);
            let poller = Poller::new(Arc::new(PgTaskStore::new(pool)));
            let views = poller.poll(kind, &ids, timeout).await?;

            for id in ids.iter().filter(|id| !views.contains_key(*id)) {
                warn!("Task {} not found in {}", id, kind.table());
            }
            println!("{}", serde_json::to_string_pretty(&views)?);
        }

        Commands::Status { kind } => {
            let counts = tasks::count_by_status(&pool, kind).await?;
            println!("=== {} ===", kind.table());
            if counts.is_empty() {
                println!("  (no tasks)");
            }
            for (status, count) in counts {
                println!("  {:<12} {}", status, count);
            }
        }
    }

    Ok(())
}

/// Submit one request, wait for its run to finish and print the final view
async fn generate(
    config: &AppConfig,
    pool: creez_tasks::db::DbPool,
    worker_config: WorkerConfig,
    request: GenerationRequest,
) -> Result<()> {
    let http = reqwest::Client::new();
    let store: Arc<dyn TaskStore> = Arc::new(PgTaskStore::new(pool.clone()));
    let worker = GenerationWorker::new(
        Arc::clone(&store),
        Arc::new(config.provider(&http)?),
        ArtifactUploader::new(config.artifact_store(&http)?, http.clone()),
        Arc::new(PgLedger::new(pool, config.free_users.clone())),
    );
    let scheduler = Scheduler::new(worker_config.max_concurrency);
    let launcher = TaskLauncher::new(Arc::clone(&store), Arc::new(worker), scheduler.clone());

    let kind = request.kind();
    let task_id = launcher.submit(request).await?;
    println!("{}", task_id);

    tokio::select! {
        report = scheduler.shutdown(worker_config.drain_timeout) => {
            if let DrainReport::TimedOut { remaining } = report {
                warn!("{} generation(s) still running at exit", remaining);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; task {} keeps its current status until polled", task_id);
            return Ok(());
        }
    }

    let poller = Poller::new(store);
    let views = poller
        .poll(kind, &[task_id], worker_config.timeout_for(kind))
        .await?;
    println!("{}", serde_json::to_string_pretty(&views)?);

    Ok(())
}
