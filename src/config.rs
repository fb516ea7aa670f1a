use clap::{Parser, ValueEnum};

/// The same executable runs as either the interactive bot or the polling
/// worker; `APP_MODE` picks which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppMode {
    Bot,
    Worker,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Job feed Telegram notifier", long_about = None)]
pub struct Config {
    /// Bot API token. Startup fails without it.
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_bot_token: String,

    #[arg(long, env = "APP_MODE", value_enum, ignore_case = true, default_value_t = AppMode::Bot)]
    pub mode: AppMode,

    /// Poll cadence for the worker, in milliseconds. Must be positive; a zero
    /// period would panic inside the interval timer instead of failing here.
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 180_000,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,

    /// Delay before respawning a crashed worker, in milliseconds.
    #[arg(long, env = "WORKER_RESTART_DELAY_MS", default_value_t = 3_000,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub worker_restart_delay_ms: u64,

    #[arg(long, env = "DATABASE_PATH", default_value = "./jobfeed.sqlite")]
    pub database_path: String,

    #[arg(long, env = "FEED_BASE_URL", default_value = "https://djinni.co/jobs/rss/")]
    pub feed_base_url: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Optional log file; console logging is always on.
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<String>,
}
