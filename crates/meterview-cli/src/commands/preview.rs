use std::sync::Arc;
use std::time::Duration;

use meterview_core::history::{CsvFormat, HistoryClient, HistoryQuery, PreviewTracker, Purpose};
use meterview_core::{Config, Series};
use tokio::sync::mpsc;

use super::RangeArgs;

pub fn run(config: &Config, range: &RangeArgs, json: bool, refresh: Option<u64>) {
    let query = range.query(super::unix_now(), CsvFormat::default());
    if let Err(e) = query.validate(Purpose::Preview) {
        eprintln!("{e}");
        std::process::exit(1);
    }
    if let Ok(samples) = query.expected_samples() {
        println!("Expected samples: {}", samples.ceil());
    }

    let client = match HistoryClient::new(range.base_url(config)) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let rt = super::runtime();
    match refresh {
        None => match rt.block_on(client.fetch_preview(&query)) {
            Ok(series) => print_preview(&series, json),
            Err(e) => {
                eprintln!("Preview failed: {e}");
                std::process::exit(1);
            }
        },
        Some(secs) => rt.block_on(watch(client, range.clone(), json, secs)),
    }
}

/// Re-fetch the trailing range every `secs` seconds. Requests may overlap;
/// a response older than one already printed is dropped.
async fn watch(client: Arc<HistoryClient>, range: RangeArgs, json: bool, secs: u64) {
    let mut tracker = PreviewTracker::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut tick = tokio::time::interval(Duration::from_secs(secs.max(1)));

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let ticket = tracker.begin();
                let query: HistoryQuery = range.query(super::unix_now(), CsvFormat::default());
                let client = Arc::clone(&client);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let result = client.fetch_preview(&query).await;
                    let _ = tx.send((ticket, result));
                });
                log::debug!("{} preview requests in flight", tracker.in_flight());
            }
            Some((ticket, result)) = rx.recv() => {
                if !tracker.finish(ticket) {
                    log::debug!("discarding preview older than the one shown");
                    continue;
                }
                match result {
                    Ok(series) => print_preview(&series, json),
                    Err(e) => eprintln!("Preview failed: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

fn print_preview(series: &Series, json: bool) {
    if json {
        match serde_json::to_string_pretty(&series.snapshot()) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Cannot encode preview: {e}"),
        }
        return;
    }
    for line in summarize(series) {
        println!("{line}");
    }
}

/// Human-readable range summary, one line per sub-series.
pub fn summarize(series: &Series) -> Vec<String> {
    let unit = series.unit_label().unwrap_or("");
    let mut lines = vec![match (series.timestamps().first(), series.timestamps().last()) {
        (Some(first), Some(last)) => {
            format!("{} samples from {first} to {last} {unit}", series.len())
        }
        _ => "No samples in range".to_string(),
    }];

    for (name, column) in series.values() {
        let present: Vec<f64> = column.iter().flatten().copied().collect();
        let missing = column.len() - present.len();
        if present.is_empty() {
            lines.push(format!("  {name:<8} no data"));
            continue;
        }
        let min = present.iter().copied().fold(f64::INFINITY, f64::min);
        let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = present.iter().sum::<f64>() / present.len() as f64;
        lines.push(format!(
            "  {name:<8} min {min:>10.3}  mean {mean:>10.3}  max {max:>10.3}  missing {missing}"
        ));
    }
    lines
}
