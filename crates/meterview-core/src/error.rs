//! Error types, one enum per concern.
//!
//! Transport failures never reach the user: the connection manager logs them
//! and reconnects. Decode failures are logged and the payload is dropped.
//! Query errors are raised before any request is sent.

use thiserror::Error;

/// Failure to open or read a telemetry connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("read failed: {0}")]
    Read(String),

    #[error("connect to {0} timed out")]
    ConnectTimeout(String),
}

/// An inbound payload that could not be turned into a message.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown envelope type '{0}'")]
    UnknownType(String),

    #[error("payload is neither an envelope object nor a record array")]
    UnexpectedShape,
}

/// A broken buffer invariant. Indicates a logic defect, not bad input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("sub-series '{key}' has {values} values for {timestamps} timestamps")]
    LengthMismatch {
        key: String,
        values: usize,
        timestamps: usize,
    },

    #[error("timestamp {next} at index {index} is older than {prev}")]
    Unsorted { index: usize, prev: i64, next: i64 },
}

/// Invalid historical query input.
#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("range end {newest} is before start {oldest}")]
    NegativeRange { oldest: i64, newest: i64 },

    #[error("range would produce {0:.0} samples, preview limit is {limit}", limit = crate::history::MAX_PREVIEW_SAMPLES)]
    TooManySamples(f64),

    #[error("power queries need a resolution (bucket_size)")]
    MissingResolution,

    #[error("resolution must be at least one second")]
    ZeroResolution,
}

/// Failure fetching or saving historical data.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("invalid history URL: {0}")]
    Url(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status} for {url}")]
    Status { status: u16, url: String },

    #[error("could not decode preview: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Unreadable or malformed configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}
