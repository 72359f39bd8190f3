use std::sync::Arc;

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::CronStream;
use clap::Parser;
use tracing::{error, info};

use rondo::application::catalog::PhraseCatalogService;
use rondo::application::digest::SlackMarkdownFormatter;
use rondo::application::dispatch::{DispatchCoordinator, DispatchOutcome};
use rondo::application::engine::CycleEngine;
use rondo::application::error::AppError;
use rondo::application::jobs::{DispatchJobContext, DispatchScheduler, process_scheduled_dispatch};
use rondo::application::repos::{PhraseStore, SettingsRepo};
use rondo::application::settings::DigestSettingsService;
use rondo::cache::{CacheBackend, CacheLayer, MemoryBackend, RedisBackend};
use rondo::config::{self, CliArgs, Command, Overrides, Settings};
use rondo::infra::db::PostgresRepositories;
use rondo::infra::error::InfraError;
use rondo::infra::slack::SlackSink;
use rondo::infra::telemetry;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    if let Err(err) = run(args).await {
        error!(target = "main", error = %err, "rondo exited with an error");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<(), AppError> {
    let settings =
        config::load(&args).map_err(|err| InfraError::configuration(err.to_string()))?;
    telemetry::init(&settings.logging)?;

    let repositories = Arc::new(
        PostgresRepositories::connect(
            &settings.database.url,
            settings.database.max_connections,
        )
        .await
        .map_err(|err| InfraError::database(err.to_string()))?,
    );

    let backend: Arc<dyn CacheBackend> = match &settings.cache.url {
        Some(url) => Arc::new(
            RedisBackend::connect(
                url,
                settings.cache.connect_attempts,
                settings.cache.connect_retry,
            )
            .await,
        ),
        None => {
            info!(target = "main", "no cache url configured, using in-process cache");
            Arc::new(MemoryBackend::new())
        }
    };
    let cache = CacheLayer::new(backend);

    let store: Arc<dyn PhraseStore> = repositories.clone();
    let settings_repo: Arc<dyn SettingsRepo> = repositories.clone();

    let engine = CycleEngine::new(store.clone());
    let digest_settings = DigestSettingsService::new(settings_repo, cache.clone());
    let catalog = PhraseCatalogService::new(store, cache);

    let (bot_token, channel_id) = match (
        settings.slack.bot_token.clone(),
        settings.slack.channel_id.clone(),
    ) {
        (Some(token), Some(channel)) => (token, channel),
        _ => {
            return Err(InfraError::configuration(
                "slack.bot_token and slack.channel_id must be set",
            )
            .into());
        }
    };
    let sink = Arc::new(SlackSink::new(reqwest::Client::new(), bot_token, channel_id));

    let coordinator = Arc::new(DispatchCoordinator::new(
        engine,
        sink,
        Arc::new(SlackMarkdownFormatter),
        digest_settings,
        catalog,
        settings.dispatch.batch_size.get(),
    ));

    match args.command.unwrap_or(Command::Serve(Overrides::default())) {
        Command::Serve(_) => serve(&settings, coordinator).await,
        Command::SendNow(_) => send_now(coordinator).await,
    }
}

/// Run the cron monitor until ctrl-c, one worker per dispatch time.
async fn serve(
    settings: &Settings,
    coordinator: Arc<DispatchCoordinator>,
) -> Result<(), AppError> {
    coordinator.start()?;

    let scheduler = DispatchScheduler::from_times(
        &settings.dispatch.times,
        settings.dispatch.timezone,
    );
    for job in scheduler.jobs() {
        info!(
            target = "main",
            id = %job.id,
            next_run_at = ?job.next_run_at,
            "dispatch schedule registered"
        );
    }

    let context = DispatchJobContext {
        coordinator: coordinator.clone(),
    };
    let timezone = scheduler.timezone();
    let mut monitor = Monitor::new();
    for (id, schedule) in scheduler.entries() {
        let worker = WorkerBuilder::new(id.as_str())
            .data(context.clone())
            .backend(CronStream::new_with_timezone(schedule.clone(), timezone))
            .build_fn(process_scheduled_dispatch);
        monitor = monitor.register(worker);
    }

    monitor
        .run_with_signal(tokio::signal::ctrl_c())
        .await
        .map_err(|err| AppError::unexpected(format!("job monitor stopped: {err}")))?;

    coordinator.stop().ok();
    info!(target = "main", "shutdown complete");
    Ok(())
}

/// Dispatch a single digest and exit, reporting "no work" distinctly.
async fn send_now(coordinator: Arc<DispatchCoordinator>) -> Result<(), AppError> {
    coordinator.start()?;
    let report = coordinator.dispatch_now().await?;
    match &report.outcome {
        DispatchOutcome::Delivered { count, cycle } => {
            info!(target = "main", count, cycle, "digest delivered");
            println!("delivered {count} phrase(s) in cycle {cycle}");
        }
        DispatchOutcome::NothingToSend => {
            info!(target = "main", "nothing eligible to send");
            println!("nothing to send");
        }
        DispatchOutcome::SinkFailed { count, reason } => {
            return Err(AppError::unexpected(format!(
                "sink rejected a batch of {count}: {reason}"
            )));
        }
        DispatchOutcome::Failed { reason } => {
            return Err(AppError::unexpected(reason.clone()));
        }
    }
    coordinator.stop().ok();
    Ok(())
}
