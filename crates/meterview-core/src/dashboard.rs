//! Application context tying decoded payloads to buffers and a renderer.

use crate::envelope::{self, DEFAULT_SERIES_KEY, Message};
use crate::error::DecodeError;
use crate::series::{MultiSeries, PlotStyle, Projection};

/// Receives a fresh projection whenever a series changes.
pub trait RenderSink {
    fn render(&mut self, key: &str, projection: &Projection);
}

/// What one payload did to the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Applied {
    /// The payload was an `initial` snapshot.
    pub reset: bool,
    /// Series keys that were updated and re-rendered.
    pub touched: Vec<String>,
}

pub struct Dashboard<R: RenderSink> {
    series: MultiSeries,
    style: PlotStyle,
    status_text: Option<String>,
    sink: R,
}

impl<R: RenderSink> Dashboard<R> {
    pub fn new(sink: R, style: PlotStyle) -> Self {
        Self {
            series: MultiSeries::new(),
            style,
            status_text: None,
            sink,
        }
    }

    /// Decode one inbound frame, merge it and re-render what it touched.
    /// On error nothing is changed.
    pub fn handle_payload(&mut self, payload: &str) -> Result<Applied, DecodeError> {
        let applied = match envelope::decode(payload)? {
            Message::Envelope(env) => Applied {
                reset: env.kind == envelope::EnvelopeKind::Initial,
                touched: self.series.apply(&env),
            },
            Message::Legacy(legacy) => {
                if legacy.info.is_some() {
                    self.status_text = legacy.info;
                }
                self.series.push(DEFAULT_SERIES_KEY, &legacy.batch);
                Applied {
                    reset: false,
                    touched: vec![DEFAULT_SERIES_KEY.to_string()],
                }
            }
        };

        for key in &applied.touched {
            self.render(key);
        }
        Ok(applied)
    }

    /// Change the plot style. Everything is re-rendered only when the style
    /// actually differs.
    pub fn set_style(&mut self, style: PlotStyle) -> bool {
        if style == self.style {
            return false;
        }
        self.style = style;
        let keys: Vec<String> = self.series.keys().map(str::to_string).collect();
        for key in &keys {
            self.render(key);
        }
        true
    }

    fn render(&mut self, key: &str) {
        if let Some(series) = self.series.get(key) {
            let projection = series.project(&self.style);
            self.sink.render(key, &projection);
        }
    }

    pub fn style(&self) -> PlotStyle {
        self.style
    }

    pub fn series(&self) -> &MultiSeries {
        &self.series
    }

    /// Free-form status line from record-array payloads.
    pub fn status_text(&self) -> Option<&str> {
        self.status_text.as_deref()
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut R {
        &mut self.sink
    }
}
