pub mod download;
pub mod monitor;
pub mod preview;
pub mod serve;
pub mod tail;

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Args;
use meterview_core::history::{CsvFormat, HistoryQuery, Quantity};
use meterview_core::{Config, ConnectionConfig};

/// Overrides for the telemetry connection.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// WebSocket endpoint (overrides config)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Seconds without a message before reconnecting (overrides config)
    #[arg(long)]
    pub idle_timeout: Option<u64>,
}

impl ConnectionArgs {
    pub fn resolve(&self, config: &Config) -> (String, ConnectionConfig) {
        let endpoint = self
            .endpoint
            .clone()
            .unwrap_or_else(|| config.endpoint.clone());
        let mut conn = config.connection();
        if let Some(secs) = self.idle_timeout {
            conn.idle_timeout = Duration::from_secs(secs.max(1));
        }
        (endpoint, conn)
    }
}

/// A historical range. Defaults to the last day at one sample per minute.
#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// Range start, unix seconds (default: newest - last)
    #[arg(long, allow_hyphen_values = true)]
    pub oldest: Option<i64>,

    /// Range end, unix seconds (default: now)
    #[arg(long, allow_hyphen_values = true)]
    pub newest: Option<i64>,

    /// Range length in seconds when --oldest is not given
    #[arg(long, default_value = "86400")]
    pub last: u64,

    /// Quantity to query
    #[arg(long, default_value = "power", value_parser = ["power", "gas"])]
    pub quantity: String,

    /// Seconds per aggregated sample (power only)
    #[arg(long, default_value = "60")]
    pub bucket_size: u64,

    /// History server base URL (overrides config)
    #[arg(long)]
    pub base_url: Option<String>,
}

impl RangeArgs {
    pub fn query(&self, now: i64, csv_format: CsvFormat) -> HistoryQuery {
        let newest = self.newest.unwrap_or(now);
        let oldest = self
            .oldest
            .unwrap_or_else(|| newest.saturating_sub(i64::try_from(self.last).unwrap_or(i64::MAX)));
        let quantity = if self.quantity == "gas" {
            Quantity::Gas
        } else {
            Quantity::Power
        };
        HistoryQuery {
            oldest,
            newest,
            quantity,
            bucket_size: (quantity == Quantity::Power).then_some(self.bucket_size),
            csv_format,
        }
    }

    pub fn base_url<'a>(&'a self, config: &'a Config) -> &'a str {
        self.base_url.as_deref().unwrap_or(&config.history_base_url)
    }
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// `info` by default, `RUST_LOG` overrides. With a path, logs are appended
/// to that file instead of stderr.
pub fn init_logging(file: Option<&Path>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(path) = file {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(f) => {
                builder.target(env_logger::Target::Pipe(Box::new(f)));
            }
            Err(e) => {
                eprintln!("Cannot open log file {}: {e}", path.display());
                std::process::exit(1);
            }
        }
    }
    builder.init();
}

pub fn load_config(path: &Path) -> Config {
    match Config::load(Some(path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

pub fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Cannot start async runtime: {e}");
            std::process::exit(1);
        }
    }
}
