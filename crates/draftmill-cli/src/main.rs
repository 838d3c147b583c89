use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::Mutex;

mod config;

use draftmill_channels::slack::{interactions_router, SlackConfig, SlackDmPoller, SlackTransport};
use draftmill_channels::{ChatEventHandler, ChatTransport};
use draftmill_core::{ContentCycleJob, IdeaRegistry, MiningQueue, Pipeline, PollJob};
use draftmill_drafting::{DraftingService, LlmDrafter, StubDrafter};
use draftmill_schema::Transcript;
use draftmill_scheduler::Job;
use draftmill_store::{HttpRecordStore, MemRecordStore, RecordStore};
use draftmill_tldv::{TldvClient, TranscriptFeed, TranscriptPoller};

use config::AppConfig;

#[derive(Parser)]
#[command(name = "draftmill", version, about = "Transcript-to-content pipeline")]
struct Cli {
    #[arg(long, default_value = "draftmill.yaml", help = "Config file path")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the pipeline: schedulers, Slack DM poller, interactions webhook")]
    Start,
    #[command(about = "Validate the config file and schedule expressions")]
    Validate,
    #[command(about = "Run one content cycle synchronously")]
    Cycle,
    #[command(about = "Mine a window of recent transcripts on demand")]
    Mine {
        #[arg(long, default_value_t = 90, help = "Window in days")]
        days: i64,
    },
}

/// Transcript feed for offline runs: nothing ever arrives.
struct NullFeed;

#[async_trait]
impl TranscriptFeed for NullFeed {
    async fn poll_new(&self) -> Result<Vec<Transcript>> {
        Ok(vec![])
    }
}

struct App {
    pipeline: Arc<Pipeline>,
    mining: Arc<MiningQueue>,
    feed: Arc<dyn TranscriptFeed>,
    store: Arc<dyn RecordStore>,
}

async fn build(config: &AppConfig) -> Result<App> {
    let store: Arc<dyn RecordStore> = if config.offline {
        Arc::new(MemRecordStore::new())
    } else {
        Arc::new(HttpRecordStore::new(
            &config.store.api_key,
            &config.store.api_base,
        ))
    };
    store
        .ensure_schema()
        .await
        .context("record store schema check failed")?;

    let drafting: Arc<dyn DraftingService> = if config.offline {
        Arc::new(StubDrafter)
    } else {
        Arc::new(LlmDrafter::new(
            &config.drafting.api_key,
            &config.drafting.api_base,
            &config.drafting.model,
        ))
    };

    let feed: Arc<dyn TranscriptFeed> = if config.offline {
        Arc::new(NullFeed)
    } else {
        Arc::new(TranscriptPoller::new(
            TldvClient::new(&config.tldv.api_key, &config.tldv.api_base),
            store.clone(),
            Utc::now() - Duration::days(7),
        ))
    };

    let chat: Arc<dyn ChatTransport> = Arc::new(SlackTransport::new(slack_config(config)));

    let registry = Arc::new(Mutex::new(IdeaRegistry::new()));
    let mining = Arc::new(MiningQueue::new(
        registry.clone(),
        drafting.clone(),
        store.clone(),
    ));
    let pipeline = Arc::new(Pipeline::new(
        registry,
        mining.clone(),
        drafting,
        store.clone(),
        chat,
        feed.clone(),
        config.voice.clone(),
    ));
    pipeline.seed_from_store().await;

    Ok(App {
        pipeline,
        mining,
        feed,
        store,
    })
}

fn slack_config(config: &AppConfig) -> SlackConfig {
    SlackConfig::new(
        &config.slack.bot_token,
        &config.slack.owner_channel,
        &config.slack.owner_user_id,
    )
    .with_poll_interval(config.slack.poll_interval_secs)
}

async fn start(config: AppConfig) -> Result<()> {
    let app = build(&config).await?;

    let _poll_job = Job::spawn(
        "transcript-poll",
        config.schedules.poll.clone(),
        Arc::new(PollJob::new(app.feed.clone(), app.mining.clone())),
    );
    let _cycle_job = Job::spawn(
        "content-cycle",
        config.schedules.content_cycle.clone(),
        Arc::new(ContentCycleJob::new(app.pipeline.clone())),
    );

    let handler: Arc<dyn ChatEventHandler> = app.pipeline.clone();
    let poller = SlackDmPoller::new(slack_config(&config), handler.clone());
    tokio::spawn(async move {
        if let Err(e) = poller.run().await {
            tracing::error!("slack DM poller exited: {e:#}");
        }
    });

    let router = interactions_router(handler);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.slack.interactions_port))
        .await
        .context("failed to bind interactions webhook")?;
    tracing::info!(
        "draftmill up — interactions webhook on :{}",
        config.slack.interactions_port
    );
    axum::serve(listener, router)
        .await
        .context("interactions webhook exited")?;
    Ok(())
}

async fn cycle(config: AppConfig) -> Result<()> {
    let app = build(&config).await?;
    app.pipeline.run_content_cycle().await?;
    println!("content cycle complete");
    Ok(())
}

async fn mine(config: AppConfig, days: i64) -> Result<()> {
    let app = build(&config).await?;
    let transcripts = app
        .store
        .recent_transcripts(Utc::now() - Duration::days(days))
        .await
        .context("transcript window load failed")?;
    let minted = app.mining.mine_on_demand(transcripts).await;
    println!("mined {} new idea(s)", minted.len());
    for idea in minted {
        println!("  [{}] {}", idea.suggested_format.as_str(), idea.hook);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate => {
            let config = config::load(&cli.config)?;
            config::validate(&config)?;
            println!("config ok: {}", cli.config.display());
            Ok(())
        }
        Commands::Start => start(config::load(&cli.config)?).await,
        Commands::Cycle => cycle(config::load(&cli.config)?).await,
        Commands::Mine { days } => mine(config::load(&cli.config)?, days).await,
    }
}
