//! aegis-core: scan session control for the Aegis console.
//!
//! The controller starts and stops backend scans, keeps a live log stream
//! attached while a scan runs (reconnecting across drops), and retains the
//! most recent entries in a bounded buffer for display.
//!
//! ## Modules
//!
//! - [`session`]: session states, project name validation, transition table
//! - [`supervisor`]: generation-tagged log stream supervision and reconnects
//! - [`buffer`]: fixed-capacity ring of log entries
//! - [`controller`]: the event loop tying the three together
//! - [`backend`]: traits the controller talks to
//! - [`http`] / [`ws`]: REST and WebSocket implementations of those traits
//! - [`config`]: `~/.aegis/console.toml` loading

pub mod backend;
pub mod buffer;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod session;
pub mod supervisor;
pub mod ws;

pub use backend::{LogFrames, ScannerBackend, StreamConnector};
pub use buffer::{LogBuffer, LogEntry, DEFAULT_LOG_CAPACITY};
pub use config::{load_config, ConsoleConfig};
pub use controller::{ControllerEvent, ControllerOptions, ControllerUpdate, ScanController};
pub use error::{ConsoleError, Result};
pub use http::HttpBackend;
pub use session::{PendingCommand, ProjectName, SessionState};
pub use supervisor::{CloseReason, Generation, StreamEvent, StreamUpdate};
pub use ws::WsConnector;

pub use aegis_protocol::LogLevel;
