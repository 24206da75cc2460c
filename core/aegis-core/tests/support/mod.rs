//! In-memory scanner backend and log feed used by the controller tests.

#![allow(dead_code)]

use aegis_core::{
    ConsoleError, ControllerUpdate, LogFrames, ProjectName, Result, ScanController,
    ScannerBackend, StreamConnector,
};
use aegis_protocol::{CommandAck, ScanStatus, StatusReport};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub type Controller = ScanController<FakeBackend, FakeConnector>;

#[derive(Default)]
pub struct FakeBackend {
    running: Mutex<bool>,
    project: Mutex<Option<String>>,
    start_failures: Mutex<VecDeque<String>>,
    stop_failures: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn idle() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn already_running(project: Option<&str>) -> Arc<Self> {
        let backend = Self::default();
        *backend.running.lock().unwrap() = true;
        *backend.project.lock().unwrap() = project.map(str::to_string);
        Arc::new(backend)
    }

    pub fn fail_next_start(&self, message: &str) {
        self.start_failures
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn fail_next_stop(&self, message: &str) {
        self.stop_failures
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn rejection(context: &str, message: String) -> ConsoleError {
        ConsoleError::Backend {
            context: context.to_string(),
            status: 500,
            message,
        }
    }
}

#[async_trait]
impl ScannerBackend for FakeBackend {
    async fn status(&self) -> Result<StatusReport> {
        self.record("status".to_string());
        let running = *self.running.lock().unwrap();
        Ok(StatusReport {
            status: if running {
                ScanStatus::Running
            } else {
                ScanStatus::Idle
            },
            components: None,
            project: self.project.lock().unwrap().clone(),
        })
    }

    async fn start(&self, project: &ProjectName) -> Result<CommandAck> {
        self.record(format!("start {}", project));
        if let Some(message) = self.start_failures.lock().unwrap().pop_front() {
            return Err(Self::rejection("start scanner", message));
        }
        *self.running.lock().unwrap() = true;
        Ok(CommandAck {
            status: Some("success".to_string()),
            message: None,
        })
    }

    async fn stop(&self) -> Result<CommandAck> {
        self.record("stop".to_string());
        if let Some(message) = self.stop_failures.lock().unwrap().pop_front() {
            return Err(Self::rejection("stop scanner", message));
        }
        *self.running.lock().unwrap() = false;
        Ok(CommandAck::default())
    }
}

/// Hands out pre-scripted connections in order. Once the script runs out,
/// every open attempt is refused.
#[derive(Default)]
pub struct FakeConnector {
    scripted: Mutex<VecDeque<mpsc::UnboundedReceiver<String>>>,
    opens: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues one connection; the returned sender feeds it, dropping the
    /// sender closes it.
    pub fn script_connection(&self) -> mpsc::UnboundedSender<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripted.lock().unwrap().push_back(rx);
        tx
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnector for FakeConnector {
    async fn open(&self) -> Result<LogFrames> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let rx = self
            .scripted
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ConsoleError::Stream("connection refused".to_string()))?;
        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|payload| (payload, rx))
        })
        .boxed())
    }
}

pub fn frame(content: &str) -> String {
    serde_json::json!({
        "time": "12:00:00",
        "level": "INFO",
        "content": content,
    })
    .to_string()
}

pub async fn step(controller: &mut Controller) -> ControllerUpdate {
    controller.step().await.expect("controller event")
}

pub fn contents(controller: &Controller) -> Vec<String> {
    controller
        .logs()
        .into_iter()
        .map(|entry| entry.content)
        .collect()
}
