use meterview_core::{Config, ConnectionManager, PlotStyle, SplitKind, WsConnector};
use tokio::sync::mpsc;

use super::ConnectionArgs;

pub fn run(config: &Config, conn: &ConnectionArgs, style: Option<&str>, include_zero: bool) {
    let (endpoint, conn_config) = conn.resolve(config);
    let style = PlotStyle {
        split: match style {
            Some("total") => SplitKind::Total,
            Some(_) => SplitKind::Split,
            None => config.plot.split,
        },
        include_zero: include_zero || config.plot.include_zero,
    };

    // The supervisor runs on the runtime's workers; the TUI loop stays on
    // this thread.
    let rt = super::runtime();
    let _guard = rt.enter();

    let (tx, rx) = mpsc::unbounded_channel();
    let manager = ConnectionManager::new(WsConnector, conn_config);
    let handle = manager.connect(endpoint.clone(), move |payload| {
        let _ = tx.send(payload);
    });
    log::info!("monitoring {endpoint}");

    let mut app = crate::tui::app::App::new(endpoint, style, rx, handle.subscribe());
    let result = app.run();
    rt.block_on(handle.shutdown());

    if let Err(e) = result {
        eprintln!("TUI error: {e}");
        std::process::exit(1);
    }
}
