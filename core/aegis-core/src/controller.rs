//! The scan session controller.
//!
//! Owns the session machine, the stream supervisor and the log buffer, and is
//! the only place any of them change. Backend round-trips, the status probe,
//! connection tasks and reconnect timers run as tokio tasks that report back
//! through one channel; `handle_event` applies those reports in arrival order.
//! A presentation layer drives it by calling `start`/`stop` for user intent and
//! looping on `step` (or `next_event` + `handle_event`).
//!
//! Must be used from within a tokio runtime.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::backend::{ScannerBackend, StreamConnector};
use crate::buffer::{LogBuffer, LogEntry, DEFAULT_LOG_CAPACITY};
use crate::config::ConsoleConfig;
use crate::error::Result;
use crate::session::{
    PendingCommand, ProjectName, SessionEvent, SessionMachine, SessionState, SupervisorAction,
};
use crate::supervisor::{StreamEvent, StreamSupervisor, StreamUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub reconnect_delay: Duration,
    pub log_capacity: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(3),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl From<&ConsoleConfig> for ControllerOptions {
    fn from(config: &ConsoleConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
            log_capacity: config.log_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    Session(SessionEvent),
    Stream(StreamEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerUpdate {
    /// A backend command finished. `error` is set for failures that did not
    /// change the outcome (stop, probe) as well as for start failures.
    Session {
        command: Option<PendingCommand>,
        state: SessionState,
        error: Option<String>,
    },
    Stream(StreamUpdate),
}

pub struct ScanController<B: ScannerBackend, C: StreamConnector> {
    backend: Arc<B>,
    session: SessionMachine,
    supervisor: StreamSupervisor<C>,
    buffer: LogBuffer,
    events_tx: UnboundedSender<ControllerEvent>,
    events_rx: UnboundedReceiver<ControllerEvent>,
}

impl<B: ScannerBackend, C: StreamConnector> ScanController<B, C> {
    pub fn new(backend: Arc<B>, connector: Arc<C>, options: ControllerOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let supervisor = StreamSupervisor::new(connector, events_tx.clone(), options.reconnect_delay);
        Self {
            backend,
            session: SessionMachine::new(),
            supervisor,
            buffer: LogBuffer::with_capacity(options.log_capacity),
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> &SessionState {
        self.session.state()
    }

    pub fn in_flight(&self) -> Option<&PendingCommand> {
        self.session.pending()
    }

    pub fn is_busy(&self) -> bool {
        self.session.pending().is_some()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.buffer.snapshot()
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    pub fn supervisor(&self) -> &StreamSupervisor<C> {
        &self.supervisor
    }

    /// Issues the one-shot status probe. If the backend reports a running
    /// scan, the session becomes `Running` without a local start.
    pub fn initialize(&mut self) -> Result<()> {
        self.session.begin_probe()?;
        let backend = Arc::clone(&self.backend);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match backend.status().await {
                Ok(report) if report.is_running() => SessionEvent::ProbeReportedRunning {
                    project: report
                        .project
                        .as_deref()
                        .and_then(|name| ProjectName::parse(name).ok()),
                },
                Ok(_) => SessionEvent::ProbeReportedIdle,
                Err(err) => SessionEvent::ProbeFailed {
                    cause: err.to_string(),
                },
            };
            let _ = events.send(ControllerEvent::Session(event));
        });
        Ok(())
    }

    /// Validates `project` and sends the start command. Returns as soon as
    /// the command is in flight; the outcome arrives through `step`.
    pub fn start(&mut self, project: &str) -> Result<ProjectName> {
        let project = self.session.begin_start(project)?;
        tracing::info!(project = %project, "Starting scan");

        let backend = Arc::clone(&self.backend);
        let events = self.events_tx.clone();
        let requested = project.clone();
        tokio::spawn(async move {
            let event = match backend.start(&requested).await {
                Ok(_) => SessionEvent::StartSucceeded { project: requested },
                Err(err) => SessionEvent::StartFailed {
                    cause: err.to_string(),
                },
            };
            let _ = events.send(ControllerEvent::Session(event));
        });
        Ok(project)
    }

    /// Sends the stop command. The session goes idle when it completes,
    /// whether or not the backend acknowledged it.
    pub fn stop(&mut self) -> Result<()> {
        self.session.begin_stop()?;
        tracing::info!("Stopping scan");

        let backend = Arc::clone(&self.backend);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let error = backend.stop().await.err().map(|err| err.to_string());
            let _ = events.send(ControllerEvent::Session(SessionEvent::StopCompleted { error }));
        });
        Ok(())
    }

    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        self.events_rx.recv().await
    }

    pub fn handle_event(&mut self, event: ControllerEvent) -> ControllerUpdate {
        match event {
            ControllerEvent::Session(event) => self.apply_session_event(event),
            ControllerEvent::Stream(event) => {
                ControllerUpdate::Stream(self.supervisor.handle_event(event, &mut self.buffer))
            }
        }
    }

    /// Waits for the next event and applies it.
    pub async fn step(&mut self) -> Option<ControllerUpdate> {
        let event = self.next_event().await?;
        Some(self.handle_event(event))
    }

    fn apply_session_event(&mut self, event: SessionEvent) -> ControllerUpdate {
        let command = self.session.pending().cloned();
        let error = match &event {
            SessionEvent::ProbeFailed { cause } => {
                tracing::warn!(error = %cause, "Scanner status probe failed");
                Some(cause.clone())
            }
            SessionEvent::StartFailed { cause } => {
                tracing::warn!(error = %cause, "Scanner start failed");
                Some(cause.clone())
            }
            SessionEvent::StopCompleted { error: Some(cause) } => {
                tracing::warn!(error = %cause, "Scanner stop failed; disengaging anyway");
                Some(cause.clone())
            }
            _ => None,
        };

        match self.session.complete(&event) {
            SupervisorAction::Engage => self.supervisor.engage(),
            SupervisorAction::Disengage => self.supervisor.disengage(),
            SupervisorAction::None => {}
        }

        ControllerUpdate::Session {
            command,
            state: self.session.state().clone(),
            error,
        }
    }
}
