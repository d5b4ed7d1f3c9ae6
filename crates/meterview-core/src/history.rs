//! Historical range queries: validation, URL building, preview fetches and
//! raw downloads.

use std::io::Write;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::envelope::SeriesBatch;
use crate::error::{HistoryError, QueryError};
use crate::series::Series;

/// Largest range a preview may request, in samples.
pub const MAX_PREVIEW_SAMPLES: u64 = 1_000_000;

/// Approximate cadence of gas meter readings.
pub const GAS_SAMPLE_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantity {
    #[default]
    Power,
    Gas,
}

impl Quantity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Gas => "gas",
        }
    }
}

/// CSV dialect of downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsvFormat {
    /// Comma separated, decimal point.
    #[default]
    Csv,
    /// Semicolon separated, decimal comma.
    Excel,
}

impl CsvFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "excel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(Self::Csv),
            "excel" => Some(Self::Excel),
            _ => None,
        }
    }

    pub fn separator(self) -> char {
        match self {
            Self::Csv => ',',
            Self::Excel => ';',
        }
    }

    /// Render one number in this dialect.
    pub fn number(self, value: f64) -> String {
        let text = value.to_string();
        match self {
            Self::Csv => text,
            Self::Excel => text.replace('.', ","),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Json,
    Csv,
}

impl ExportKind {
    fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

/// What a query is for. Previews are capped, downloads are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Preview,
    Download,
}

// ---------------------------------------------------------------------------
// HistoryQuery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Range start, unix seconds.
    pub oldest: i64,
    /// Range end, unix seconds.
    pub newest: i64,
    pub quantity: Quantity,
    /// Seconds per aggregated sample. Ignored for gas.
    pub bucket_size: Option<u64>,
    pub csv_format: CsvFormat,
}

impl HistoryQuery {
    /// Rough number of samples the range will produce. Negative for an
    /// inverted range.
    pub fn expected_samples(&self) -> Result<f64, QueryError> {
        let span = self.newest as f64 - self.oldest as f64;
        let per_sample = match self.quantity {
            Quantity::Gas => GAS_SAMPLE_SECS,
            Quantity::Power => match self.bucket_size {
                None => return Err(QueryError::MissingResolution),
                Some(0) => return Err(QueryError::ZeroResolution),
                Some(bucket) => bucket,
            },
        };
        Ok(span / per_sample as f64)
    }

    pub fn validate(&self, purpose: Purpose) -> Result<(), QueryError> {
        let samples = self.expected_samples()?;
        if samples < 0.0 {
            return Err(QueryError::NegativeRange {
                oldest: self.oldest,
                newest: self.newest,
            });
        }
        if purpose == Purpose::Preview && samples > MAX_PREVIEW_SAMPLES as f64 {
            return Err(QueryError::TooManySamples(samples.ceil()));
        }
        Ok(())
    }

    /// `download/samples_custom.<ext>` relative to `base`, with the query
    /// parameters the server expects.
    pub fn url(&self, base: &Url, kind: ExportKind) -> Result<Url, HistoryError> {
        let path = format!("download/samples_custom.{}", kind.extension());
        let mut url = base
            .join(&path)
            .map_err(|e| HistoryError::Url(format!("{base}: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("oldest", &self.oldest.to_string())
                .append_pair("newest", &self.newest.to_string())
                .append_pair("quantity", self.quantity.as_str());
            if self.quantity == Quantity::Power
                && let Some(bucket) = self.bucket_size
            {
                pairs.append_pair("bucket_size", &bucket.to_string());
            }
            if kind == ExportKind::Csv {
                pairs.append_pair("format", self.csv_format.as_str());
            }
        }
        Ok(url)
    }
}

// ---------------------------------------------------------------------------
// PreviewTracker
// ---------------------------------------------------------------------------

/// Issued per preview request, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PreviewTicket(u64);

/// Fences overlapping preview requests so a response never replaces a newer
/// one that is already shown.
#[derive(Debug, Default)]
pub struct PreviewTracker {
    issued: u64,
    shown: u64,
    in_flight: usize,
}

impl PreviewTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> PreviewTicket {
        self.issued += 1;
        self.in_flight += 1;
        PreviewTicket(self.issued)
    }

    /// Mark a request complete. Returns `true` when its response should be
    /// displayed, `false` when a newer response has been displayed already.
    pub fn finish(&mut self, ticket: PreviewTicket) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        if ticket.0 <= self.shown {
            return false;
        }
        self.shown = ticket.0;
        true
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

// ---------------------------------------------------------------------------
// HistoryClient
// ---------------------------------------------------------------------------

pub struct HistoryClient {
    http: reqwest::Client,
    base: Url,
}

impl HistoryClient {
    pub fn new(base: &str) -> Result<Self, HistoryError> {
        let base = Url::parse(base).map_err(|e| HistoryError::Url(format!("{base}: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Fetch a range as a single series, loaded without window trimming.
    pub async fn fetch_preview(&self, query: &HistoryQuery) -> Result<Series, HistoryError> {
        query.validate(Purpose::Preview)?;
        let url = query.url(&self.base, ExportKind::Json)?;
        log::info!("fetching preview {url}");

        let response = self.get(url).await?;
        let body = response.text().await?;
        let batch: SeriesBatch = serde_json::from_str(&body)?;
        log::debug!("preview returned {} samples", batch.len());
        Ok(Series::load(&batch))
    }

    /// Stream the CSV export of a range into `out`. Returns bytes written.
    pub async fn download<W: Write>(
        &self,
        query: &HistoryQuery,
        out: &mut W,
    ) -> Result<u64, HistoryError> {
        query.validate(Purpose::Download)?;
        let url = query.url(&self.base, ExportKind::Csv)?;
        log::info!("downloading {url}");

        let mut response = self.get(url).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        out.flush()?;
        Ok(written)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, HistoryError> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}
