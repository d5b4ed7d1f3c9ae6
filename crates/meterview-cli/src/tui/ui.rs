//! TUI rendering.
//!
//! ┌──────────────────────────────────────────────┐
//! │  meterview  ws://localhost:8001  connected    │
//! ├─────────────────┬────────────────────────────┤
//! │  Series         │  minute  P (W)             │
//! │  ▸ minute   60  │   ⡀⠤⠒⠉⠉⠒⠤⡀                 │
//! │    hour     24  │                            │
//! ├─────────────────┴────────────────────────────┤
//! │  style: split   zero: off   reconnects: 0    │
//! ├──────────────────────────────────────────────┤
//! │  ↑↓ series   s: split/total   z: zero   q    │
//! └──────────────────────────────────────────────┘

use super::app::App;
use meterview_core::{ConnectionState, Projection};
use ratatui::{prelude::*, widgets::*};

const TRACE_COLORS: [Color; 6] = [
    Color::Cyan,
    Color::Yellow,
    Color::Magenta,
    Color::Green,
    Color::Red,
    Color::Blue,
];

pub fn draw(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Min(10),   // main
            Constraint::Length(3), // status
            Constraint::Length(1), // keys
        ])
        .split(f.area());

    draw_title(f, rows[0], app);
    draw_main(f, rows[1], app);
    draw_status(f, rows[2], app);
    draw_keys(f, rows[3]);
}

fn draw_title(f: &mut Frame, area: Rect, app: &App) {
    let conn = app.connection();
    let state_style = match conn.state {
        ConnectionState::Connected => Style::default().fg(Color::Green).bold(),
        ConnectionState::Connecting => Style::default().fg(Color::Yellow).bold(),
        ConnectionState::Disconnected => Style::default().fg(Color::Red).bold(),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Line::from(vec![
            Span::styled(" meterview ", Style::default().bold().fg(Color::Cyan)),
            Span::raw(format!("  {}  ", app.endpoint())),
            Span::styled(conn.state.label(), state_style),
            Span::styled(
                format!("  #{}  {} msgs ", conn.generation, conn.messages),
                Style::default().fg(Color::DarkGray),
            ),
        ]));

    f.render_widget(block, area);
}

fn draw_main(f: &mut Frame, area: Rect, app: &App) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(24), Constraint::Min(20)])
        .split(area);

    draw_series_list(f, cols[0], app);
    draw_chart(f, cols[1], app);
}

fn draw_series_list(f: &mut Frame, area: Rect, app: &App) {
    let rows: Vec<Row> = app
        .charts()
        .iter()
        .enumerate()
        .map(|(i, (key, _))| {
            let is_cursor = i == app.cursor();
            let pointer = if is_cursor { "▸" } else { " " };
            let style = if is_cursor {
                Style::default().bg(Color::DarkGray).fg(Color::White)
            } else {
                Style::default()
            };
            Row::new(vec![
                pointer.to_string(),
                key.clone(),
                app.sample_count(key).to_string(),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),  // pointer
            Constraint::Length(12), // key
            Constraint::Length(6),  // samples
        ],
    )
    .block(Block::default().borders(Borders::ALL).title(" Series "));

    f.render_widget(table, area);
}

fn draw_chart(f: &mut Frame, area: Rect, app: &App) {
    let Some((key, projection)) = app.selected() else {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" waiting for data ");
        let p = Paragraph::new("No series received yet")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(p, area);
        return;
    };

    let points: Vec<Vec<(f64, f64)>> = projection
        .traces
        .iter()
        .map(|trace| projection.points(trace))
        .collect();

    let datasets: Vec<Dataset> = projection
        .traces
        .iter()
        .zip(&points)
        .enumerate()
        .map(|(i, (trace, data))| {
            Dataset::default()
                .name(trace.name.clone())
                .marker(symbols::Marker::Braille)
                .style(Style::default().fg(TRACE_COLORS[i % TRACE_COLORS.len()]))
                .data(data)
        })
        .collect();

    let (x_min, x_max) = x_bounds(projection);
    let (y_min, y_max) = y_bounds(projection);
    let unit = projection.unit_label.as_deref().unwrap_or("");

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {key}  {unit} ")),
        )
        .x_axis(Axis::default().bounds([x_min, x_max]).labels(vec![
            Line::from(format!("{x_min:.0}")),
            Line::from(format!("{x_max:.0}")),
        ]))
        .y_axis(Axis::default().bounds([y_min, y_max]).labels(vec![
            Line::from(format!("{y_min:.2}")),
            Line::from(format!("{y_max:.2}")),
        ]));

    f.render_widget(chart, area);
}

/// Window-anchored when the series has a window, data extent otherwise.
pub fn x_bounds(projection: &Projection) -> (f64, f64) {
    if let Some((lo, hi)) = projection.x_range {
        return widen(lo as f64, hi as f64);
    }
    match (projection.x.first(), projection.x.last()) {
        (Some(&lo), Some(&hi)) => widen(lo as f64, hi as f64),
        _ => (0.0, 1.0),
    }
}

pub fn y_bounds(projection: &Projection) -> (f64, f64) {
    match projection.y_range {
        Some((lo, hi)) => widen(lo, hi),
        None => (0.0, 1.0),
    }
}

/// Ratatui needs a non-empty interval.
fn widen(lo: f64, hi: f64) -> (f64, f64) {
    if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) }
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let style = app.style();
    let conn = app.connection();
    let mut spans = vec![
        Span::raw(format!(" style: {}", style.split.label())),
        Span::raw(format!(
            "   zero: {}",
            if style.include_zero { "on" } else { "off" }
        )),
        Span::raw(format!("   reconnects: {}", conn.reconnects)),
    ];
    if app.dropped() > 0 {
        spans.push(Span::styled(
            format!("   dropped: {}", app.dropped()),
            Style::default().fg(Color::Red),
        ));
    }
    if let Some(text) = app.status_text() {
        spans.push(Span::styled(
            format!("   {text}"),
            Style::default().fg(Color::Yellow),
        ));
    } else if let Some(err) = app.last_error() {
        spans.push(Span::styled(
            format!("   {err}"),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let p = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(" Status "));
    f.render_widget(p, area);
}

fn draw_keys(f: &mut Frame, area: Rect) {
    let bar = Paragraph::new(" ↑↓ series   s: split/total   z: include zero   q: quit")
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projection(x: Vec<i64>, x_range: Option<(i64, i64)>, y_range: Option<(f64, f64)>) -> Projection {
        Projection {
            x,
            traces: vec![],
            x_range,
            y_range,
            unit_label: None,
        }
    }

    #[test]
    fn x_bounds_prefer_window() {
        let p = projection(vec![220, 280], Some((160, 280)), None);
        assert_eq!(x_bounds(&p), (160.0, 280.0));
        let p = projection(vec![220, 280], None, None);
        assert_eq!(x_bounds(&p), (220.0, 280.0));
    }

    #[test]
    fn degenerate_bounds_are_widened() {
        let p = projection(vec![5], None, Some((2.0, 2.0)));
        assert_eq!(x_bounds(&p), (4.5, 5.5));
        assert_eq!(y_bounds(&p), (1.5, 2.5));
        assert_eq!(y_bounds(&projection(vec![], None, None)), (0.0, 1.0));
    }
}
