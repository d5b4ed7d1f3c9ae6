//! Client crate against a real dummy server on an ephemeral port.

use std::time::Duration;

use meterview_core::history::{CsvFormat, HistoryClient, HistoryQuery, Quantity};
use meterview_core::{
    ConnectionConfig, ConnectionManager, Dashboard, Message, PlotStyle, Projection, RenderSink,
    WsConnector, decode,
};
use meterview_server::{AppState, LIVE_SERIES_KEY, serve};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

struct Discard;

impl RenderSink for Discard {
    fn render(&mut self, _key: &str, _projection: &Projection) {}
}

async fn start() -> (std::net::SocketAddr, std::sync::Arc<AppState>) {
    let state = AppState::new();
    for t in 0..120 {
        state.record(t, [1.0, 2.0, 3.0]).await;
    }
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, std::sync::Arc::clone(&state)));
    (addr, state)
}

fn query(oldest: i64, newest: i64) -> HistoryQuery {
    HistoryQuery {
        oldest,
        newest,
        quantity: Quantity::Power,
        bucket_size: Some(60),
        csv_format: CsvFormat::Csv,
    }
}

#[tokio::test]
async fn preview_loads_bucketed_range() {
    let (addr, _state) = start().await;
    let client = HistoryClient::new(&format!("http://{addr}/")).unwrap();

    let series = client.fetch_preview(&query(0, 120)).await.unwrap();
    assert_eq!(series.timestamps(), &[0, 60]);
    assert_eq!(series.column("2").unwrap(), &[Some(2.0), Some(2.0)]);
    assert_eq!(series.unit_label(), Some("P (W)"));
}

#[tokio::test]
async fn download_writes_csv() {
    let (addr, _state) = start().await;
    let client = HistoryClient::new(&format!("http://{addr}/")).unwrap();

    let mut out = Vec::new();
    let written = client.download(&query(0, 60), &mut out).await.unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(written as usize, text.len());
    assert_eq!(text, "timestamp,1,2,3\n0,1,2,3\n");
}

#[tokio::test]
async fn socket_starts_with_initial_snapshot() {
    let (addr, state) = start().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let manager = ConnectionManager::new(WsConnector, ConnectionConfig::default());
    let handle = manager.connect(format!("ws://{addr}/"), move |payload| {
        let _ = tx.send(payload);
    });

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let Message::Envelope(initial) = decode(&first).unwrap() else {
        panic!("expected envelope");
    };
    assert_eq!(initial.kind, meterview_core::EnvelopeKind::Initial);
    assert_eq!(initial.series[LIVE_SERIES_KEY].len(), 60);

    state.record(120, [4.0, 5.0, 6.0]).await;
    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();

    let mut dash = Dashboard::new(Discard, PlotStyle::default());
    dash.handle_payload(&first).unwrap();
    dash.handle_payload(&second).unwrap();
    let live = dash.series().get(LIVE_SERIES_KEY).unwrap();
    assert_eq!(live.last_timestamp(), Some(120));
    assert_eq!(live.len(), 60);

    handle.shutdown().await;
}
