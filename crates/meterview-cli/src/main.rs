//! CLI for meterview, the live energy meter dashboard.

mod commands;
mod tui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "meterview")]
#[command(about = "meterview: live energy meter dashboard")]
#[command(version = meterview_core::VERSION)]
struct Cli {
    /// Configuration file (TOML). Missing file means built-in defaults.
    #[arg(long, global = true, default_value = "meterview.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Live dashboard (TUI): one chart per series, reconnecting on silence
    Monitor {
        #[command(flatten)]
        conn: commands::ConnectionArgs,

        /// Initial plot style
        #[arg(long, value_parser = ["split", "total"])]
        style: Option<String>,

        /// Force the y axis to include zero
        #[arg(long)]
        include_zero: bool,

        /// Log destination; the terminal is taken by the dashboard
        #[arg(long, default_value = "meterview.log")]
        log_file: PathBuf,
    },

    /// Print a line per update with each series' latest sample
    Tail {
        #[command(flatten)]
        conn: commands::ConnectionArgs,

        /// Only print this series
        #[arg(long)]
        series: Option<String>,

        /// Print the summed total instead of every sub-series
        #[arg(long)]
        total: bool,
    },

    /// Fetch a historical range and summarise it
    Preview {
        #[command(flatten)]
        range: commands::RangeArgs,

        /// Print the fetched series as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Re-fetch the trailing range every N seconds until Ctrl-C
        #[arg(long)]
        refresh: Option<u64>,
    },

    /// Download a historical range as CSV
    Download {
        #[command(flatten)]
        range: commands::RangeArgs,

        /// CSV dialect: csv (comma) or excel (semicolon, decimal comma)
        #[arg(long, default_value = "csv", value_parser = ["csv", "excel"])]
        format: String,

        /// Output path (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run the dummy meter server (synthetic samples)
    Serve {
        /// Host to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, default_value = "8001")]
        port: u16,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Monitor { log_file, .. } => Some(log_file.as_path()),
        _ => None,
    };
    commands::init_logging(log_file);

    let config = commands::load_config(&cli.config);

    match cli.command {
        Commands::Monitor {
            conn,
            style,
            include_zero,
            log_file: _,
        } => commands::monitor::run(&config, &conn, style.as_deref(), include_zero),
        Commands::Tail {
            conn,
            series,
            total,
        } => commands::tail::run(&config, &conn, series.as_deref(), total),
        Commands::Preview {
            range,
            json,
            refresh,
        } => commands::preview::run(&config, &range, json, refresh),
        Commands::Download {
            range,
            format,
            output,
        } => commands::download::run(&config, &range, &format, output.as_deref()),
        Commands::Serve { host, port } => commands::serve::run(&host, port),
    }
}
