//! # meterview-core
//!
//! Client-side plumbing for a live energy meter dashboard.
//!
//! A meter server pushes JSON frames over a WebSocket. This crate keeps that
//! connection alive, decodes the frames, and maintains one rolling buffer per
//! series that a renderer can project into chart traces at any time.
//!
//! ## Quick Start
//!
//! ```no_run
//! use meterview_core::{ConnectionConfig, ConnectionManager, WsConnector};
//!
//! # async fn demo() {
//! let manager = ConnectionManager::new(WsConnector, ConnectionConfig::default());
//! let handle = manager.connect("ws://localhost:8001", |payload| {
//!     println!("{} bytes", payload.len());
//! });
//! // ...
//! handle.shutdown().await;
//! # }
//! ```
//!
//! ## Architecture
//!
//! Socket → [`connection`] → [`envelope::decode`] → [`series::MultiSeries`]
//! → [`series::Projection`] → [`dashboard::RenderSink`]
//!
//! The connection supervisor replaces a socket that has been silent for the
//! idle timeout (5 s by default), exactly one socket at a time. Buffers pad
//! missing buckets with `None` and evict samples that fall out of the
//! series window.

pub mod config;
pub mod connection;
pub mod dashboard;
pub mod envelope;
pub mod error;
pub mod history;
pub mod series;

pub use config::Config;
pub use connection::{
    ConnectionConfig, ConnectionHandle, ConnectionManager, ConnectionState, ConnectionStatus,
    Connector, Socket, WsConnector,
};
pub use dashboard::{Applied, Dashboard, RenderSink};
pub use envelope::{Envelope, EnvelopeKind, Message, SeriesBatch, decode};
pub use error::{ConfigError, DecodeError, HistoryError, InvariantViolation, QueryError, TransportError};
pub use history::{CsvFormat, HistoryClient, HistoryQuery, PreviewTracker, Quantity};
pub use series::{MultiSeries, PlotStyle, Projection, Series, SplitKind, Trace};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
