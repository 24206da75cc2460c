//! Scan session lifecycle.
//!
//! `reduce` is the transition table: it maps the current state and the
//! outcome of a backend command onto the next state plus what the stream
//! supervisor must do. `SessionMachine` wraps it with input validation and the
//! in-flight guard; it never performs I/O itself.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::error::{ConsoleError, Result};

const MAX_PROJECT_NAME_CHARS: usize = 128;

static PROJECT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}\p{N}_.\-]+$").expect("valid project name regex"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProjectName(String);

impl ProjectName {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let reject = |reason: &str| ConsoleError::InvalidProjectName {
            name: raw.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(reject("project name is required"));
        }
        if trimmed.chars().count() > MAX_PROJECT_NAME_CHARS {
            return Err(reject("project name must be 128 characters or fewer"));
        }
        if !PROJECT_NAME_RE.is_match(trimmed) {
            return Err(reject(
                "project name may only contain letters, digits, '_', '-' and '.'",
            ));
        }
        if trimmed.chars().all(|c| c == '.') {
            return Err(reject("project name must not be only dots"));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Checks the name of an existing project before it is used in a lookup path.
/// Projects created through other clients may carry any text, so only names
/// that cannot form a single path segment are rejected. The name is returned
/// unchanged.
pub fn project_lookup_name(raw: &str) -> Result<&str> {
    let reject = |reason: &str| ConsoleError::InvalidProjectName {
        name: raw.to_string(),
        reason: reason.to_string(),
    };

    if raw.trim().is_empty() {
        return Err(reject("project name is required"));
    }
    if raw.contains('/') {
        return Err(reject("project name must not contain '/'"));
    }
    if raw.chars().all(|c| c == '.') {
        return Err(reject("project name must not be only dots"));
    }
    Ok(raw)
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    /// `project` is `None` only when an already-running scan was discovered by
    /// the status probe and the backend did not say which project it serves.
    Running { project: Option<ProjectName> },
    Errored { cause: String },
}

impl SessionState {
    pub fn running(project: ProjectName) -> Self {
        SessionState::Running {
            project: Some(project),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running { .. } => "running",
            SessionState::Errored { .. } => "errored",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Running {
                project: Some(project),
            } => write!(f, "running ({})", project),
            SessionState::Running { project: None } => f.write_str("running"),
            SessionState::Errored { cause } => write!(f, "errored: {}", cause),
        }
    }
}

/// A backend round-trip the machine is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingCommand {
    Probe,
    Start(ProjectName),
    Stop,
}

impl fmt::Display for PendingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingCommand::Probe => f.write_str("status probe"),
            PendingCommand::Start(project) => write!(f, "start {}", project),
            PendingCommand::Stop => f.write_str("stop"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ProbeReportedRunning { project: Option<ProjectName> },
    ProbeReportedIdle,
    ProbeFailed { cause: String },
    StartSucceeded { project: ProjectName },
    StartFailed { cause: String },
    /// Stop is best-effort; `error` only feeds diagnostics.
    StopCompleted { error: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorAction {
    Engage,
    Disengage,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SessionState,
    pub action: SupervisorAction,
}

impl Transition {
    fn stay(current: &SessionState) -> Self {
        Self {
            state: current.clone(),
            action: SupervisorAction::None,
        }
    }
}

pub fn reduce(current: &SessionState, event: &SessionEvent) -> Transition {
    match (current, event) {
        (SessionState::Idle, SessionEvent::ProbeReportedRunning { project }) => Transition {
            state: SessionState::Running {
                project: project.clone(),
            },
            action: SupervisorAction::Engage,
        },
        (
            SessionState::Idle | SessionState::Errored { .. },
            SessionEvent::StartSucceeded { project },
        ) => Transition {
            state: SessionState::running(project.clone()),
            action: SupervisorAction::Engage,
        },
        (SessionState::Idle | SessionState::Errored { .. }, SessionEvent::StartFailed { cause }) => {
            Transition {
                state: SessionState::Errored {
                    cause: cause.clone(),
                },
                action: SupervisorAction::None,
            }
        }
        (SessionState::Running { .. }, SessionEvent::StopCompleted { .. }) => Transition {
            state: SessionState::Idle,
            action: SupervisorAction::Disengage,
        },
        _ => Transition::stay(current),
    }
}

#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    pending: Option<PendingCommand>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            pending: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    pub fn begin_probe(&mut self) -> Result<()> {
        self.ensure_idle_slot()?;
        if self.state != SessionState::Idle {
            return Err(ConsoleError::InvalidTransition {
                action: "probe status",
                state: self.state.as_str(),
            });
        }
        self.pending = Some(PendingCommand::Probe);
        Ok(())
    }

    /// Validates the request and marks a start as in flight.
    /// The name is checked first so a bad name never reaches the backend.
    pub fn begin_start(&mut self, raw_project: &str) -> Result<ProjectName> {
        let project = ProjectName::parse(raw_project)?;
        self.ensure_idle_slot()?;
        if self.state.is_running() {
            return Err(ConsoleError::InvalidTransition {
                action: "start",
                state: self.state.as_str(),
            });
        }
        self.pending = Some(PendingCommand::Start(project.clone()));
        Ok(project)
    }

    pub fn begin_stop(&mut self) -> Result<()> {
        self.ensure_idle_slot()?;
        if !self.state.is_running() {
            return Err(ConsoleError::InvalidTransition {
                action: "stop",
                state: self.state.as_str(),
            });
        }
        self.pending = Some(PendingCommand::Stop);
        Ok(())
    }

    /// Applies a command outcome and clears the in-flight marker.
    pub fn complete(&mut self, event: &SessionEvent) -> SupervisorAction {
        self.pending = None;
        let transition = reduce(&self.state, event);
        if transition.state != self.state {
            tracing::info!(
                from = %self.state,
                to = %transition.state,
                "Scan session transition"
            );
        }
        self.state = transition.state;
        transition.action
    }

    fn ensure_idle_slot(&self) -> Result<()> {
        match &self.pending {
            Some(pending) => Err(ConsoleError::Busy {
                pending: pending.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}
