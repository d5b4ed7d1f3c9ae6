use meterview_core::{
    Config, ConnectionManager, Dashboard, PlotStyle, Projection, RenderSink, SplitKind,
    WsConnector,
};
use tokio::sync::mpsc;

use super::ConnectionArgs;

/// Prints the newest sample of each rendered series.
struct LinePrinter {
    only: Option<String>,
}

impl RenderSink for LinePrinter {
    fn render(&mut self, key: &str, projection: &Projection) {
        if self.only.as_deref().is_some_and(|only| only != key) {
            return;
        }
        if let Some(line) = latest_line(key, projection) {
            println!("{line}");
        }
    }
}

/// `<series> <timestamp> name=value ...` for the last row. Missing samples
/// print as `-`.
pub fn latest_line(key: &str, projection: &Projection) -> Option<String> {
    let t = projection.x.last()?;
    let mut line = format!("{key} {t}");
    for trace in &projection.traces {
        match trace.y.last().copied().flatten() {
            Some(v) => line.push_str(&format!(" {}={v:.3}", trace.name)),
            None => line.push_str(&format!(" {}=-", trace.name)),
        }
    }
    if let Some(unit) = &projection.unit_label {
        line.push_str(&format!(" [{unit}]"));
    }
    Some(line)
}

pub fn run(config: &Config, conn: &ConnectionArgs, only: Option<&str>, total: bool) {
    let (endpoint, conn_config) = conn.resolve(config);
    let style = PlotStyle {
        split: if total {
            SplitKind::Total
        } else {
            config.plot.split
        },
        include_zero: config.plot.include_zero,
    };
    let mut dashboard = Dashboard::new(
        LinePrinter {
            only: only.map(str::to_string),
        },
        style,
    );

    let rt = super::runtime();
    rt.block_on(async move {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(WsConnector, conn_config);
        let handle = manager.connect(endpoint, move |payload| {
            let _ = tx.send(payload);
        });

        loop {
            tokio::select! {
                Some(payload) = rx.recv() => {
                    if let Err(e) = dashboard.handle_payload(&payload) {
                        log::warn!("dropping payload: {e}");
                    }
                    if let Some(text) = dashboard.status_text() {
                        log::debug!("status: {text}");
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        handle.shutdown().await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterview_core::Trace;

    #[test]
    fn latest_line_shows_last_row() {
        let projection = Projection {
            x: vec![10, 11],
            traces: vec![
                Trace {
                    name: "1".to_string(),
                    y: vec![Some(0.0), Some(1.25)],
                },
                Trace {
                    name: "2".to_string(),
                    y: vec![Some(0.0), None],
                },
            ],
            x_range: None,
            y_range: None,
            unit_label: Some("P (W)".to_string()),
        };
        assert_eq!(
            latest_line("minute", &projection).as_deref(),
            Some("minute 11 1=1.250 2=- [P (W)]")
        );
    }

    #[test]
    fn empty_projection_prints_nothing() {
        let projection = Projection {
            x: vec![],
            traces: vec![],
            x_range: None,
            y_range: None,
            unit_label: None,
        };
        assert_eq!(latest_line("minute", &projection), None);
    }
}
