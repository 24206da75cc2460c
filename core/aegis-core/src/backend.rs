//! Seams between the controller and the scanner backend.
//!
//! The controller only needs three commands and a way to open the live log
//! feed. Production code talks HTTP and WebSocket (`http`, `ws`); tests plug
//! in-memory fakes behind the same traits.

use aegis_protocol::{CommandAck, StatusReport};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;
use crate::session::ProjectName;

/// Raw text payloads of one live connection. The stream ending means the
/// connection closed, for whatever reason.
pub type LogFrames = BoxStream<'static, String>;

#[async_trait]
pub trait ScannerBackend: Send + Sync + 'static {
    async fn status(&self) -> Result<StatusReport>;
    async fn start(&self, project: &ProjectName) -> Result<CommandAck>;
    async fn stop(&self) -> Result<CommandAck>;
}

#[async_trait]
pub trait StreamConnector: Send + Sync + 'static {
    async fn open(&self) -> Result<LogFrames>;
}
