use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use meterview_core::Config;
use meterview_core::history::{CsvFormat, HistoryClient};

use super::RangeArgs;

pub fn run(config: &Config, range: &RangeArgs, format: &str, output: Option<&Path>) {
    let csv_format = CsvFormat::parse(format).unwrap_or_default();
    let query = range.query(super::unix_now(), csv_format);

    let client = match HistoryClient::new(range.base_url(config)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let mut out: Box<dyn Write> = match output {
        Some(path) => match File::create(path) {
            Ok(f) => Box::new(BufWriter::new(f)),
            Err(e) => {
                eprintln!("Cannot create {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => Box::new(io::stdout().lock()),
    };

    let rt = super::runtime();
    match rt.block_on(client.download(&query, &mut out)) {
        Ok(bytes) => {
            if let Some(path) = output {
                eprintln!("Wrote {bytes} bytes to {}", path.display());
            }
        }
        Err(e) => {
            eprintln!("Download failed: {e}");
            std::process::exit(1);
        }
    }
}
