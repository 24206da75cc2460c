//! Log stream supervision.
//!
//! The supervisor keeps at most one live connection to the backend log feed
//! while the session is running. Every connection attempt gets a fresh
//! generation number; the connection task and the reconnect timer tag
//! everything they report with it, and `handle_event` drops anything whose
//! generation is no longer current. That is how a connection closed by
//! `disengage` (or replaced by a reconnect) can never append late entries or
//! schedule another attempt.
//!
//! Tasks only report. All state changes happen in `handle_event`, which the
//! controller calls from its single event loop.

use chrono::Utc;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::backend::StreamConnector;
use crate::buffer::{LogBuffer, LogEntry};
use crate::controller::ControllerEvent;

pub type Generation = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Opened {
        generation: Generation,
    },
    Frame {
        generation: Generation,
        payload: String,
        received_at: chrono::DateTime<Utc>,
    },
    Closed {
        generation: Generation,
        reason: CloseReason,
    },
    ReconnectDue {
        generation: Generation,
    },
}

impl StreamEvent {
    pub fn generation(&self) -> Generation {
        match self {
            StreamEvent::Opened { generation }
            | StreamEvent::Frame { generation, .. }
            | StreamEvent::Closed { generation, .. }
            | StreamEvent::ReconnectDue { generation } => *generation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    OpenFailed(String),
    Ended,
}

/// What a stream event did, for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    Opened {
        generation: Generation,
    },
    Appended(LogEntry),
    ReconnectScheduled {
        generation: Generation,
        delay: Duration,
        reason: CloseReason,
    },
    Reconnecting {
        generation: Generation,
    },
    Stale {
        generation: Generation,
    },
}

pub struct StreamSupervisor<C: StreamConnector> {
    connector: Arc<C>,
    events: UnboundedSender<ControllerEvent>,
    reconnect_delay: Duration,
    generation: Generation,
    engaged: bool,
    live: bool,
    attempts: u64,
    connection: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl<C: StreamConnector> StreamSupervisor<C> {
    pub fn new(
        connector: Arc<C>,
        events: UnboundedSender<ControllerEvent>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            connector,
            events,
            reconnect_delay,
            generation: 0,
            engaged: false,
            live: false,
            attempts: 0,
            connection: None,
            reconnect: None,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// True once the current generation reported `Opened` and until it closes.
    pub fn connection_live(&self) -> bool {
        self.live
    }

    /// True while a connection task for the current generation exists.
    pub fn connection_pending(&self) -> bool {
        self.connection.is_some()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_some()
    }

    /// Connection attempts made since creation, reconnects included.
    pub fn connect_attempts(&self) -> u64 {
        self.attempts
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Opens a connection attempt immediately, replacing any previous one.
    pub fn engage(&mut self) {
        self.cancel_tasks();
        self.engaged = true;
        tracing::info!(generation = self.generation + 1, "Log stream engaged");
        self.connect();
    }

    /// Closes the live connection and cancels a pending reconnect.
    /// Calling it while nothing is engaged does nothing.
    pub fn disengage(&mut self) {
        if !self.engaged && self.connection.is_none() && self.reconnect.is_none() {
            return;
        }
        self.cancel_tasks();
        self.engaged = false;
        // Anything still in the channel from the old connection is now stale.
        self.generation += 1;
        tracing::info!(generation = self.generation, "Log stream disengaged");
    }

    pub fn handle_event(&mut self, event: StreamEvent, buffer: &mut LogBuffer) -> StreamUpdate {
        let generation = event.generation();
        if !self.engaged || generation != self.generation {
            tracing::debug!(
                generation,
                current = self.generation,
                engaged = self.engaged,
                "Ignoring stale stream event"
            );
            return StreamUpdate::Stale { generation };
        }

        match event {
            StreamEvent::Opened { generation } => {
                self.live = true;
                tracing::info!(generation, "Log stream open");
                StreamUpdate::Opened { generation }
            }
            StreamEvent::Frame {
                payload,
                received_at,
                ..
            } => {
                let entry = LogEntry::from_payload(&payload, received_at);
                buffer.push(entry.clone());
                StreamUpdate::Appended(entry)
            }
            StreamEvent::Closed { generation, reason } => {
                self.live = false;
                self.connection = None;
                match &reason {
                    CloseReason::OpenFailed(cause) => tracing::warn!(
                        generation,
                        error = %cause,
                        delay_ms = self.reconnect_delay.as_millis() as u64,
                        "Log stream connect failed; retrying"
                    ),
                    CloseReason::Ended => tracing::warn!(
                        generation,
                        delay_ms = self.reconnect_delay.as_millis() as u64,
                        "Log stream closed; reconnecting"
                    ),
                }
                self.schedule_reconnect(generation);
                StreamUpdate::ReconnectScheduled {
                    generation,
                    delay: self.reconnect_delay,
                    reason,
                }
            }
            StreamEvent::ReconnectDue { .. } => {
                self.reconnect = None;
                self.connect();
                StreamUpdate::Reconnecting {
                    generation: self.generation,
                }
            }
        }
    }

    fn connect(&mut self) {
        self.generation += 1;
        self.attempts += 1;
        self.live = false;

        let generation = self.generation;
        let connector = Arc::clone(&self.connector);
        let events = self.events.clone();
        self.connection = Some(tokio::spawn(async move {
            let send = |event: StreamEvent| events.send(ControllerEvent::Stream(event)).is_ok();

            let mut frames = match connector.open().await {
                Ok(frames) => frames,
                Err(err) => {
                    send(StreamEvent::Closed {
                        generation,
                        reason: CloseReason::OpenFailed(err.to_string()),
                    });
                    return;
                }
            };

            if !send(StreamEvent::Opened { generation }) {
                return;
            }
            while let Some(payload) = frames.next().await {
                let frame = StreamEvent::Frame {
                    generation,
                    payload,
                    received_at: Utc::now(),
                };
                if !send(frame) {
                    return;
                }
            }
            send(StreamEvent::Closed {
                generation,
                reason: CloseReason::Ended,
            });
        }));
    }

    fn schedule_reconnect(&mut self, generation: Generation) {
        if let Some(previous) = self.reconnect.take() {
            previous.abort();
        }
        let delay = self.reconnect_delay;
        let events = self.events.clone();
        self.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(ControllerEvent::Stream(StreamEvent::ReconnectDue {
                generation,
            }));
        }));
    }

    fn cancel_tasks(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
        if let Some(reconnect) = self.reconnect.take() {
            reconnect.abort();
        }
        self.live = false;
    }
}

impl<C: StreamConnector> Drop for StreamSupervisor<C> {
    fn drop(&mut self) {
        self.cancel_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LogFrames;
    use crate::error::{ConsoleError, Result};
    use async_trait::async_trait;
    use futures_util::stream;
    use tokio::sync::mpsc;

    /// Opens an endless empty stream, or fails when `refuse` is set.
    struct QuietConnector {
        refuse: bool,
    }

    #[async_trait]
    impl StreamConnector for QuietConnector {
        async fn open(&self) -> Result<LogFrames> {
            if self.refuse {
                return Err(ConsoleError::Stream("connection refused".to_string()));
            }
            Ok(stream::pending::<String>().boxed())
        }
    }

    fn supervisor(
        refuse: bool,
    ) -> (
        StreamSupervisor<QuietConnector>,
        mpsc::UnboundedReceiver<ControllerEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let supervisor = StreamSupervisor::new(
            Arc::new(QuietConnector { refuse }),
            tx,
            Duration::from_secs(3),
        );
        (supervisor, rx)
    }

    async fn next_stream_event(rx: &mut mpsc::UnboundedReceiver<ControllerEvent>) -> StreamEvent {
        match rx.recv().await.expect("event") {
            ControllerEvent::Stream(event) => event,
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn disengage_is_idempotent() {
        let (mut supervisor, _rx) = supervisor(false);
        supervisor.disengage();
        assert_eq!(supervisor.generation(), 0);

        supervisor.engage();
        supervisor.disengage();
        let after_first = supervisor.generation();
        supervisor.disengage();
        assert_eq!(supervisor.generation(), after_first);
        assert!(!supervisor.is_engaged());
        assert!(!supervisor.connection_pending());
        assert!(!supervisor.reconnect_pending());
    }

    #[tokio::test]
    async fn frames_from_superseded_generation_are_ignored() {
        let (mut supervisor, mut rx) = supervisor(false);
        let mut buffer = LogBuffer::default();

        supervisor.engage();
        let opened = next_stream_event(&mut rx).await;
        let old_generation = opened.generation();
        supervisor.handle_event(opened, &mut buffer);
        assert!(supervisor.connection_live());

        supervisor.engage();
        let update = supervisor.handle_event(
            StreamEvent::Frame {
                generation: old_generation,
                payload: "late".to_string(),
                received_at: Utc::now(),
            },
            &mut buffer,
        );
        assert_eq!(
            update,
            StreamUpdate::Stale {
                generation: old_generation
            }
        );
        assert!(buffer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_open_schedules_single_retry() {
        let (mut supervisor, mut rx) = supervisor(true);
        let mut buffer = LogBuffer::default();

        supervisor.engage();
        let closed = next_stream_event(&mut rx).await;
        assert!(matches!(
            closed,
            StreamEvent::Closed {
                reason: CloseReason::OpenFailed(_),
                ..
            }
        ));

        let update = supervisor.handle_event(closed, &mut buffer);
        assert!(matches!(update, StreamUpdate::ReconnectScheduled { .. }));
        assert!(supervisor.reconnect_pending());
        assert!(!supervisor.connection_pending());
        assert_eq!(supervisor.connect_attempts(), 1);

        let started = tokio::time::Instant::now();
        let due = next_stream_event(&mut rx).await;
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(matches!(due, StreamEvent::ReconnectDue { .. }));

        supervisor.handle_event(due, &mut buffer);
        assert_eq!(supervisor.connect_attempts(), 2);
        assert!(!supervisor.reconnect_pending());
        assert!(supervisor.connection_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn disengage_cancels_pending_reconnect() {
        let (mut supervisor, mut rx) = supervisor(true);
        let mut buffer = LogBuffer::default();

        supervisor.engage();
        let closed = next_stream_event(&mut rx).await;
        supervisor.handle_event(closed, &mut buffer);
        assert!(supervisor.reconnect_pending());

        supervisor.disengage();
        assert!(!supervisor.reconnect_pending());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(supervisor.connect_attempts(), 1);
    }
}
