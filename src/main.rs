use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::error;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;

mod aggregate;
mod bot;
mod config;
mod dispatch;
mod drafts;
mod error;
mod feed;
mod logger;
mod models;
mod reconcile;
mod render;
mod scheduler;
mod store;
mod telegram;
mod worker;

use config::{AppMode, Config};

fn build_scheduler(
    config: &Config,
    store: store::SettingsStore,
) -> Result<scheduler::PollScheduler<aggregate::Aggregator<feed::FeedClient>, telegram::TelegramApi>> {
    let client = feed::FeedClient::new(&config.feed_base_url)?;
    let aggregator = aggregate::Aggregator::new(client);
    let api = telegram::TelegramApi::new(&config.telegram_bot_token)?;
    let dispatcher = dispatch::Dispatcher::new(aggregator, api, store.clone());
    Ok(scheduler::PollScheduler::new(dispatcher, store))
}

async fn run_worker_mode(config: Config) -> Result<()> {
    let store = store::SettingsStore::open(&config.database_path).await?;
    let scheduler = build_scheduler(&config, store)?;
    worker::run_worker(scheduler, Duration::from_millis(config.poll_interval_ms)).await
}

async fn run_bot_mode(config: Config) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // One signal task flips the shared shutdown flag for the bot loop and the
    // worker supervisor alike.
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        let _ = shutdown_tx.send(true);
    });

    let supervisor = worker::WorkerSupervisor::new(
        Duration::from_millis(config.worker_restart_delay_ms),
        shutdown_rx.clone(),
    );
    let supervisor_task = tokio::spawn(supervisor.run());

    let store = store::SettingsStore::open(&config.database_path).await?;
    let api = telegram::TelegramApi::new(&config.telegram_bot_token)?;
    let scheduler = build_scheduler(&config, store.clone())?;
    let app = bot::BotApp::new(api, store, scheduler);
    app.run(shutdown_rx).await?;

    supervisor_task.await??;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    logger::init(logger::parse_log_level(&config.log_level), config.log_file.as_deref())?;

    match config.mode {
        AppMode::Worker => {
            if let Err(err) = run_worker_mode(config).await {
                // Fatal to the worker context only; the supervisor respawns us.
                error!("polling worker crashed: {err:#}");
                std::process::exit(1);
            }
            Ok(())
        }
        AppMode::Bot => run_bot_mode(config).await,
    }
}
