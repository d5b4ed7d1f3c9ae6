//! Dummy meter server.
//!
//! Generates one synthetic three-phase power sample per second, keeps a day
//! of raw samples and a one-minute live buffer, and serves:
//!
//! - `GET /` (WebSocket): an `initial` envelope with the live buffer, then an
//!   `update` per generated sample
//! - `GET /download/samples_custom.json`: bucket-averaged range as one batch
//! - `GET /download/samples_custom.csv`: the same range as CSV
//! - `GET /health`: sample counts

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, broadcast};

use meterview_core::envelope::{self, Envelope, EnvelopeKind, SeriesBatch};
use meterview_core::history::{CsvFormat, Quantity};
use meterview_core::series::Series;

/// Key of the live series pushed over the socket.
pub const LIVE_SERIES_KEY: &str = "minute";
/// Live buffer retention.
pub const LIVE_WINDOW_SECS: u64 = 60;
/// Raw sample retention.
pub const STORE_WINDOW_SECS: u64 = 24 * 3600;

const POWER_COLUMNS: [&str; 3] = ["1", "2", "3"];
const POWER_UNIT: &str = "P (W)";
const GAS_COLUMN: &str = "volume";
const GAS_UNIT: &str = "V (m^3)";

// ---------------------------------------------------------------------------
// Sample generation
// ---------------------------------------------------------------------------

/// Three sinusoids of different periods with a little uniform noise.
pub fn dummy_sample(t: i64) -> [f64; 3] {
    let x = t as f64;
    [
        (x * 0.1).sin() + rand::random::<f64>() * 0.1,
        (x * 0.2).sin() + rand::random::<f64>() * 0.2,
        (x * 0.5).sin() + rand::random::<f64>() * 0.05,
    ]
}

fn power_batch(t: i64, values: [f64; 3], window: u64) -> SeriesBatch {
    SeriesBatch {
        timestamps: vec![t],
        values: POWER_COLUMNS
            .iter()
            .zip(values)
            .map(|(name, v)| (name.to_string(), vec![Some(v)]))
            .collect(),
        bucket_size: Some(1),
        window_size: Some(window),
        unit_label: Some(POWER_UNIT.to_string()),
        kind: Some(Quantity::Power.as_str().to_string()),
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// An encoded `update` envelope and the timestamp it carries.
#[derive(Debug, Clone)]
struct Update {
    t: i64,
    text: String,
}

/// Shared server state.
pub struct AppState {
    store: Mutex<Series>,
    live: Mutex<Series>,
    updates: broadcast::Sender<Update>,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        let (updates, _) = broadcast::channel(256);
        Arc::new(Self {
            store: Mutex::new(Series::new()),
            live: Mutex::new(Series::new()),
            updates,
        })
    }

    /// Store a sample and broadcast it to connected clients.
    pub async fn record(&self, t: i64, values: [f64; 3]) {
        let live_batch = power_batch(t, values, LIVE_WINDOW_SECS);
        self.store
            .lock()
            .await
            .push_update(&power_batch(t, values, STORE_WINDOW_SECS));
        self.live.lock().await.push_update(&live_batch);

        let update = Envelope {
            kind: EnvelopeKind::Update,
            series: [(LIVE_SERIES_KEY.to_string(), live_batch)]
                .into_iter()
                .collect(),
            history_window_size: None,
        };
        match envelope::encode(&update) {
            // No receivers is fine.
            Ok(text) => {
                let _ = self.updates.send(Update { t, text });
            }
            Err(e) => log::error!("encoding update failed: {e}"),
        }
    }

    /// The `initial` envelope and the newest timestamp it contains.
    async fn initial(&self) -> serde_json::Result<(String, Option<i64>)> {
        let (live, through) = {
            let live = self.live.lock().await;
            (live.snapshot(), live.last_timestamp())
        };
        let text = envelope::encode(&Envelope {
            kind: EnvelopeKind::Initial,
            series: [(LIVE_SERIES_KEY.to_string(), live)].into_iter().collect(),
            history_window_size: Some(LIVE_WINDOW_SECS),
        })?;
        Ok((text, through))
    }

    /// Subscribe to updates, then snapshot the live buffer.
    async fn feed(&self) -> serde_json::Result<LiveFeed> {
        let updates = self.updates.subscribe();
        let (initial, through) = self.initial().await?;
        Ok(LiveFeed {
            initial,
            through,
            updates,
        })
    }
}

/// One client's view of the live buffer: a snapshot and the updates after it.
struct LiveFeed {
    initial: String,
    through: Option<i64>,
    updates: broadcast::Receiver<Update>,
}

impl LiveFeed {
    /// Next update newer than the snapshot. `None` once the sender is gone.
    async fn next(&mut self) -> Option<String> {
        loop {
            match self.updates.recv().await {
                Ok(update) if self.through.is_some_and(|last| update.t <= last) => {
                    log::trace!("skipping update at {} already in the snapshot", update.t);
                }
                Ok(update) => return Some(update.text),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("client fell {n} updates behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Produce one sample per second, forever.
pub async fn generate(state: Arc<AppState>) {
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tick.tick().await;
        let t = unix_now();
        state.record(t, dummy_sample(t)).await;
        log::trace!("generated sample at {t}");
    }
}

// ---------------------------------------------------------------------------
// Range queries
// ---------------------------------------------------------------------------

/// Average samples into `bucket`-second buckets aligned to multiples of
/// `bucket`. Missing samples are ignored; an all-missing bucket is missing.
pub fn aggregate(batch: &SeriesBatch, bucket: u64) -> SeriesBatch {
    let bucket = i64::try_from(bucket.max(1)).unwrap_or(i64::MAX);
    let mut out = SeriesBatch {
        bucket_size: Some(bucket as u64),
        window_size: None,
        unit_label: batch.unit_label.clone(),
        kind: batch.kind.clone(),
        timestamps: Vec::new(),
        values: batch.values.keys().map(|k| (k.clone(), Vec::new())).collect(),
    };

    let mut start = 0;
    while start < batch.timestamps.len() {
        let key = batch.timestamps[start].div_euclid(bucket) * bucket;
        let end = batch.timestamps[start..]
            .iter()
            .position(|t| t.div_euclid(bucket) * bucket != key)
            .map_or(batch.timestamps.len(), |n| start + n);

        out.timestamps.push(key);
        for (name, column) in &batch.values {
            let present: Vec<f64> = column[start..end].iter().flatten().copied().collect();
            let mean = (!present.is_empty())
                .then(|| present.iter().sum::<f64>() / present.len() as f64);
            if let Some(target) = out.values.get_mut(name) {
                target.push(mean);
            }
        }
        start = end;
    }
    out
}

/// `timestamp,<sub-series...>` followed by one row per sample. Missing
/// samples are empty cells. Fields holding the separator are quoted.
pub fn render_csv(batch: &SeriesBatch, format: CsvFormat) -> Result<String, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(format.separator() as u8)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(std::iter::once("timestamp").chain(batch.values.keys().map(String::as_str)))?;
    for (i, t) in batch.timestamps.iter().enumerate() {
        let mut row = vec![t.to_string()];
        row.extend(batch.values.values().map(|column| match column.get(i) {
            Some(Some(v)) => format.number(*v),
            _ => String::new(),
        }));
        writer.write_record(&row)?;
    }

    let bytes = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Debug, Deserialize)]
struct RangeParams {
    oldest: Option<f64>,
    newest: Option<f64>,
    #[serde(default)]
    quantity: Quantity,
    bucket_size: Option<u64>,
    #[serde(default)]
    format: CsvFormat,
}

impl AppState {
    async fn range(&self, params: &RangeParams) -> Result<SeriesBatch, (StatusCode, String)> {
        if params.quantity == Quantity::Gas {
            return Ok(SeriesBatch {
                values: [(GAS_COLUMN.to_string(), Vec::new())].into_iter().collect(),
                unit_label: Some(GAS_UNIT.to_string()),
                kind: Some(Quantity::Gas.as_str().to_string()),
                ..Default::default()
            });
        }

        let bucket = params.bucket_size.unwrap_or(1);
        if bucket == 0 {
            return Err((
                StatusCode::BAD_REQUEST,
                "bucket_size must be at least 1".to_string(),
            ));
        }
        let oldest = params.oldest.map_or(i64::MIN, |t| t.floor() as i64);
        let newest = params.newest.map_or(i64::MAX, |t| t.floor() as i64);

        let raw = self.store.lock().await.slice(oldest, newest);
        Ok(aggregate(&raw, bucket))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn handle_socket(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| stream_updates(socket, state))
}

async fn stream_updates(mut socket: WebSocket, state: Arc<AppState>) {
    let mut feed = match state.feed().await {
        Ok(feed) => feed,
        Err(e) => {
            log::error!("encoding initial snapshot failed: {e}");
            return;
        }
    };
    let initial = std::mem::take(&mut feed.initial);
    if socket.send(WsMessage::Text(initial.into())).await.is_err() {
        return;
    }
    log::info!("client connected");

    while let Some(text) = feed.next().await {
        if socket.send(WsMessage::Text(text.into())).await.is_err() {
            break;
        }
    }
    log::info!("client disconnected");
}

async fn handle_range_json(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeParams>,
) -> Result<Json<SeriesBatch>, (StatusCode, String)> {
    state.range(&params).await.map(Json)
}

async fn handle_range_csv(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let batch = state.range(&params).await?;
    let body = render_csv(&batch, params.format).map_err(|e| {
        log::error!("rendering CSV failed: {e}");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(([(header::CONTENT_TYPE, "text/csv")], body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    stored_samples: usize,
    live_samples: usize,
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stored_samples = state.store.lock().await.len();
    let live_samples = state.live.lock().await.len();
    Json(HealthResponse {
        status: "ok",
        version: meterview_core::VERSION,
        stored_samples,
        live_samples,
    })
}

/// Build the axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_socket))
        .route("/download/samples_custom.json", get(handle_range_json))
        .route("/download/samples_custom.csv", get(handle_range_csv))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Serve an already bound listener until the process ends.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    axum::serve(listener, build_router(state)).await
}

/// Run the dummy server with its sample generator.
pub async fn run_server(host: &str, port: u16) -> std::io::Result<()> {
    let state = AppState::new();
    tokio::spawn(generate(Arc::clone(&state)));

    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    log::info!("dummy meter server listening on {addr}");
    serve(listener, state).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(timestamps: &[i64], a: &[Option<f64>]) -> SeriesBatch {
        SeriesBatch {
            timestamps: timestamps.to_vec(),
            values: [("a".to_string(), a.to_vec())].into_iter().collect(),
            bucket_size: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn aggregate_averages_aligned_buckets() {
        let out = aggregate(
            &raw(&[60, 61, 119, 120, 185], &[Some(1.0), Some(2.0), Some(3.0), None, Some(5.0)]),
            60,
        );
        assert_eq!(out.timestamps, vec![60, 120, 180]);
        assert_eq!(out.values["a"], vec![Some(2.0), None, Some(5.0)]);
        assert_eq!(out.bucket_size, Some(60));
        assert_eq!(out.window_size, None);
    }

    #[test]
    fn aggregate_with_unit_bucket_is_identity_on_timestamps() {
        let out = aggregate(&raw(&[1, 2, 3], &[Some(1.0), None, Some(3.0)]), 1);
        assert_eq!(out.timestamps, vec![1, 2, 3]);
        assert_eq!(out.values["a"], vec![Some(1.0), None, Some(3.0)]);
    }

    #[test]
    fn csv_header_and_missing_cells() {
        let mut batch = raw(&[10, 11], &[Some(1.5), None]);
        batch.values.insert("b".to_string(), vec![Some(2.0), Some(0.25)]);

        assert_eq!(
            render_csv(&batch, CsvFormat::Csv).unwrap(),
            "timestamp,a,b\n10,1.5,2\n11,,0.25\n"
        );
        assert_eq!(
            render_csv(&batch, CsvFormat::Excel).unwrap(),
            "timestamp;a;b\n10;1,5;2\n11;;0,25\n"
        );
    }

    #[test]
    fn csv_quotes_names_holding_the_separator() {
        let batch = SeriesBatch {
            timestamps: vec![10],
            values: [("L1,L2".to_string(), vec![Some(1.5)])].into_iter().collect(),
            ..Default::default()
        };
        let text = render_csv(&batch, CsvFormat::Csv).unwrap();
        assert_eq!(text, "timestamp,\"L1,L2\"\n10,1.5\n");

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(text.as_bytes());
        let widths: Vec<usize> = reader.records().map(|r| r.unwrap().len()).collect();
        assert_eq!(widths, vec![2, 2]);

        let mut batch = batch;
        batch.values.insert("a;b".to_string(), vec![Some(0.5)]);
        assert_eq!(
            render_csv(&batch, CsvFormat::Excel).unwrap(),
            "timestamp;L1,L2;\"a;b\"\n10;1,5;0,5\n"
        );
    }

    #[test]
    fn dummy_sample_stays_near_the_sinusoids() {
        for t in [0, 17, 1_700_000_000] {
            let [a, b, c] = dummy_sample(t);
            let x = t as f64;
            assert!((a - (x * 0.1).sin()).abs() <= 0.1);
            assert!((b - (x * 0.2).sin()).abs() <= 0.2);
            assert!((c - (x * 0.5).sin()).abs() <= 0.05);
        }
    }

    #[tokio::test]
    async fn store_and_live_buffers_have_their_own_windows() {
        let state = AppState::new();
        for t in 1000..1100 {
            state.record(t, [1.0, 2.0, 3.0]).await;
        }
        assert_eq!(state.store.lock().await.len(), 100);
        let live = state.live.lock().await;
        assert_eq!(live.len(), LIVE_WINDOW_SECS as usize);
        assert_eq!(live.last_timestamp(), Some(1099));
    }

    #[tokio::test]
    async fn feed_skips_updates_already_in_the_snapshot() {
        let state = AppState::new();
        state.record(1, [1.0, 1.0, 1.0]).await;

        // A sample recorded between subscribing and snapshotting.
        let updates = state.updates.subscribe();
        state.record(2, [2.0, 2.0, 2.0]).await;
        let (initial, through) = state.initial().await.unwrap();
        let mut feed = LiveFeed {
            initial,
            through,
            updates,
        };
        assert_eq!(feed.through, Some(2));
        state.record(3, [3.0, 3.0, 3.0]).await;

        let text = feed.next().await.unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(envelope["type"], "update");
        assert_eq!(envelope["series"][LIVE_SERIES_KEY]["timestamps"], serde_json::json!([3]));
    }

    #[tokio::test]
    async fn feed_without_samples_passes_every_update() {
        let state = AppState::new();
        let mut feed = state.feed().await.unwrap();
        assert_eq!(feed.through, None);
        state.record(5, [0.0, 0.0, 0.0]).await;
        assert!(feed.next().await.unwrap().contains("\"update\""));
    }

    #[tokio::test]
    async fn range_is_half_open_and_bucketed() {
        let state = AppState::new();
        for t in 0..120 {
            state.record(t, [t as f64, 0.0, 0.0]).await;
        }
        let params = RangeParams {
            oldest: Some(0.0),
            newest: Some(60.0),
            quantity: Quantity::Power,
            bucket_size: Some(30),
            format: CsvFormat::Csv,
        };
        let batch = state.range(&params).await.unwrap();
        assert_eq!(batch.timestamps, vec![0, 30]);
        assert_eq!(batch.values["1"], vec![Some(14.5), Some(44.5)]);
    }

    #[tokio::test]
    async fn gas_range_is_empty_volume_series() {
        let state = AppState::new();
        let params = RangeParams {
            oldest: None,
            newest: None,
            quantity: Quantity::Gas,
            bucket_size: None,
            format: CsvFormat::Csv,
        };
        let batch = state.range(&params).await.unwrap();
        assert!(batch.is_empty());
        assert!(batch.values.contains_key(GAS_COLUMN));
    }
}
