//! WebSocket implementation of the live log feed.

use async_trait::async_trait;
use futures_util::future::ready;
use futures_util::StreamExt;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::backend::{LogFrames, StreamConnector};
use crate::config::ConsoleConfig;
use crate::error::{ConsoleError, Result};

#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(config: &ConsoleConfig) -> Result<Self> {
        Ok(Self {
            url: config.stream_url()?,
            connect_timeout: config.request_timeout(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl StreamConnector for WsConnector {
    /// Connects and performs the handshake within the request timeout.
    /// The returned stream ends at the first close frame or read error.
    async fn open(&self) -> Result<LogFrames> {
        let connecting = connect_async(self.url.as_str());
        let (socket, _response) = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| {
                ConsoleError::Stream(format!(
                    "connect {}: timed out after {}ms",
                    self.url,
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|err| ConsoleError::Stream(format!("connect {}: {}", self.url, err)))?;
        tracing::debug!(url = %self.url, "Log stream connected");

        let frames = socket
            .take_while(|message| {
                ready(match message {
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(frame = ?frame, "Log stream closed by backend");
                        false
                    }
                    Ok(_) => true,
                    Err(err) => {
                        tracing::debug!(error = %err, "Log stream read failed");
                        false
                    }
                })
            })
            .filter_map(|message| {
                ready(match message {
                    Ok(Message::Text(text)) => Some(text.as_str().to_owned()),
                    Ok(Message::Binary(data)) => Some(String::from_utf8_lossy(&data).into_owned()),
                    _ => None,
                })
            })
            .boxed();

        Ok(frames)
    }
}
