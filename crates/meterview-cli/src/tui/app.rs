//! TUI application state and event loop.
//!
//! Payloads arrive from the connection supervisor over a channel and are
//! drained every tick, each one handled to completion before the next. The
//! dashboard renders into a [`ChartStore`] that keeps the newest projection
//! per series for drawing.

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use tokio::sync::{mpsc, watch};

use meterview_core::{ConnectionStatus, Dashboard, PlotStyle, Projection, RenderSink};

// ---------------------------------------------------------------------------
// ChartStore
// ---------------------------------------------------------------------------

/// Newest projection of every series, in first-seen order.
#[derive(Debug, Default)]
pub struct ChartStore {
    charts: Vec<(String, Projection)>,
}

impl RenderSink for ChartStore {
    fn render(&mut self, key: &str, projection: &Projection) {
        match self.charts.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = projection.clone(),
            None => self.charts.push((key.to_string(), projection.clone())),
        }
    }
}

impl ChartStore {
    pub fn charts(&self) -> &[(String, Projection)] {
        &self.charts
    }

    fn retain_keys(&mut self, keys: &[&str]) {
        self.charts.retain(|(k, _)| keys.contains(&k.as_str()));
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct App {
    dashboard: Dashboard<ChartStore>,
    payloads: mpsc::UnboundedReceiver<String>,
    status: watch::Receiver<ConnectionStatus>,
    endpoint: String,
    cursor: usize,
    running: bool,
    dropped: u64,
    last_error: Option<String>,
}

impl App {
    pub fn new(
        endpoint: String,
        style: PlotStyle,
        payloads: mpsc::UnboundedReceiver<String>,
        status: watch::Receiver<ConnectionStatus>,
    ) -> Self {
        Self {
            dashboard: Dashboard::new(ChartStore::default(), style),
            payloads,
            status,
            endpoint,
            cursor: 0,
            running: true,
            dropped: 0,
            last_error: None,
        }
    }

    pub fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Restore the terminal before a panic message is printed.
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
            original_hook(info);
        }));

        let result = self.run_loop(&mut terminal);

        let _ = std::panic::take_hook();
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            crossterm::cursor::Show
        )?;

        if self.dropped > 0 {
            println!("{} payloads could not be decoded (see log)", self.dropped);
        }
        result
    }

    fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        while self.running {
            self.drain();
            terminal.draw(|f| super::ui::draw(f, self))?;

            if event::poll(Duration::from_millis(100))?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                self.handle_key(key.code);
            }
        }
        Ok(())
    }

    /// Apply every payload received since the last tick.
    pub fn drain(&mut self) {
        while let Ok(payload) = self.payloads.try_recv() {
            match self.dashboard.handle_payload(&payload) {
                Ok(applied) => {
                    if applied.reset {
                        let keys: Vec<&str> =
                            applied.touched.iter().map(String::as_str).collect();
                        self.dashboard.sink_mut().retain_keys(&keys);
                    }
                }
                Err(e) => {
                    log::warn!("dropping payload: {e}");
                    self.dropped += 1;
                    self.last_error = Some(e.to_string());
                }
            }
        }
        let n = self.dashboard.sink().charts().len();
        if n > 0 && self.cursor >= n {
            self.cursor = n - 1;
        }
    }

    pub fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Char('s') => {
                let mut style = self.dashboard.style();
                style.split = style.split.toggled();
                self.dashboard.set_style(style);
            }
            KeyCode::Char('z') => {
                let mut style = self.dashboard.style();
                style.include_zero = !style.include_zero;
                self.dashboard.set_style(style);
            }
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => {
                let n = self.dashboard.sink().charts().len();
                if n > 0 {
                    self.cursor = (self.cursor + 1) % n;
                }
            }
            KeyCode::Up | KeyCode::Char('k') | KeyCode::BackTab => {
                let n = self.dashboard.sink().charts().len();
                if n > 0 {
                    self.cursor = (self.cursor + n - 1) % n;
                }
            }
            _ => {}
        }
    }

    // --- Accessors for ui ---

    pub fn charts(&self) -> &[(String, Projection)] {
        self.dashboard.sink().charts()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn selected(&self) -> Option<&(String, Projection)> {
        self.charts().get(self.cursor)
    }

    pub fn sample_count(&self, key: &str) -> usize {
        self.dashboard.series().get(key).map_or(0, |s| s.len())
    }

    pub fn style(&self) -> PlotStyle {
        self.dashboard.style()
    }

    pub fn connection(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn status_text(&self) -> Option<&str> {
        self.dashboard.status_text()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}
