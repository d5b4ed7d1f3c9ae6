//! Wire format of inbound telemetry messages.
//!
//! Two shapes arrive over the socket:
//!
//! - an envelope `{type: "initial"|"update", series: {...}, history_window_size?}`
//! - a flat record array `[{info, t, y_all}, ...]` from older servers
//!
//! `series` is normally a map of series key to [`SeriesBatch`]; older servers
//! send one bare batch, which lands under [`DEFAULT_SERIES_KEY`].

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DecodeError;

/// Key used for payloads that carry a single unnamed series.
pub const DEFAULT_SERIES_KEY: &str = "default";

/// Retention applied to record-array payloads, which carry no window.
pub const LEGACY_WINDOW_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// SeriesBatch
// ---------------------------------------------------------------------------

/// One chunk of samples for a single series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesBatch {
    /// Unix seconds, aligned positionally with every entry of `values`.
    #[serde(deserialize_with = "deserialize_epochs")]
    pub timestamps: Vec<i64>,
    /// Sub-series name to values. `null` entries are missing samples.
    #[serde(default, deserialize_with = "deserialize_values")]
    pub values: IndexMap<String, Vec<Option<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl SeriesBatch {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Timestamps are integers on the wire, but some producers emit floats.
fn deserialize_epochs<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<f64>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|t| t.floor() as i64).collect())
}

/// Values come either keyed by sub-series name, or as a positional list of
/// columns. Positional columns are named `"1"`, `"2"`, ...
fn deserialize_values<'de, D>(
    deserializer: D,
) -> Result<IndexMap<String, Vec<Option<f64>>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Values {
        Named(IndexMap<String, Vec<Option<f64>>>),
        Positional(Vec<Vec<Option<f64>>>),
    }

    Ok(match Values::deserialize(deserializer)? {
        Values::Named(map) => map,
        Values::Positional(columns) => columns
            .into_iter()
            .enumerate()
            .map(|(i, column)| ((i + 1).to_string(), column))
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Full snapshot: the receiver discards everything buffered first.
    Initial,
    /// Incremental samples merged into the buffered state.
    Update,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub series: IndexMap<String, SeriesBatch>,
    pub history_window_size: Option<u64>,
}

// ---------------------------------------------------------------------------
// Record array (older format)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyRecord {
    #[serde(default)]
    pub info: Option<String>,
    pub t: f64,
    #[serde(default)]
    pub y_all: IndexMap<String, Option<f64>>,
}

/// A record array folded into one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyBatch {
    /// Status text of the last record.
    pub info: Option<String>,
    pub batch: SeriesBatch,
}

impl LegacyBatch {
    /// Fold records into a single column-aligned batch. A key missing from a
    /// record is a missing sample at that position.
    pub fn from_records(records: Vec<LegacyRecord>) -> Self {
        let mut info = None;
        let mut timestamps = Vec::with_capacity(records.len());
        let mut values: IndexMap<String, Vec<Option<f64>>> = IndexMap::new();

        for record in records {
            let row = timestamps.len();
            timestamps.push(record.t.floor() as i64);
            for (key, y) in record.y_all {
                let column = values
                    .entry(key)
                    .or_insert_with(|| vec![None; row]);
                column.push(y);
            }
            for column in values.values_mut() {
                column.resize(row + 1, None);
            }
            if record.info.is_some() {
                info = record.info;
            }
        }

        Self {
            info,
            batch: SeriesBatch {
                timestamps,
                values,
                window_size: Some(LEGACY_WINDOW_SECS),
                ..Default::default()
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Envelope(Envelope),
    Legacy(LegacyBatch),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeriesPayload {
    Single(SeriesBatch),
    Map(IndexMap<String, SeriesBatch>),
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    series: Option<SeriesPayload>,
    #[serde(default)]
    history_window_size: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Wire {
    Envelope(RawEnvelope),
    Records(Vec<LegacyRecord>),
}

/// Decode one text frame.
pub fn decode(payload: &str) -> Result<Message, DecodeError> {
    // Syntax errors surface as `Json`, well-formed but foreign shapes as
    // `UnexpectedShape`.
    let _: serde::de::IgnoredAny = serde_json::from_str(payload)?;

    let wire: Wire =
        serde_json::from_str(payload).map_err(|_| DecodeError::UnexpectedShape)?;

    match wire {
        Wire::Envelope(raw) => {
            let kind = match raw.kind.as_str() {
                "initial" => EnvelopeKind::Initial,
                "update" => EnvelopeKind::Update,
                other => return Err(DecodeError::UnknownType(other.to_string())),
            };
            let series = match raw.series {
                Some(SeriesPayload::Single(batch)) => {
                    IndexMap::from([(DEFAULT_SERIES_KEY.to_string(), batch)])
                }
                Some(SeriesPayload::Map(map)) => map,
                None => IndexMap::new(),
            };
            Ok(Message::Envelope(Envelope {
                kind,
                series,
                history_window_size: raw.history_window_size,
            }))
        }
        Wire::Records(records) => Ok(Message::Legacy(LegacyBatch::from_records(records))),
    }
}

#[derive(Serialize)]
struct WireEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    series: &'a IndexMap<String, SeriesBatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    history_window_size: Option<u64>,
}

/// Encode an envelope the way the server sends it. Sub-series keep their
/// insertion order.
pub fn encode(envelope: &Envelope) -> serde_json::Result<String> {
    let kind = match envelope.kind {
        EnvelopeKind::Initial => "initial",
        EnvelopeKind::Update => "update",
    };
    serde_json::to_string(&WireEnvelope {
        kind,
        series: &envelope.series,
        history_window_size: envelope.history_window_size,
    })
}
