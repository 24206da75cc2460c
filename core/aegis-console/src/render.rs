//! Plain-text rendering for console output.

use aegis_core::{CloseReason, ControllerUpdate, LogEntry, SessionState, StreamUpdate};
use aegis_protocol::{AgentLog, Project, Vulnerability};

const PREVIEW_CHARS: usize = 96;

pub fn entry_line(entry: &LogEntry) -> String {
    format!("[{}] {:<7} {}", entry.time, entry.level, entry.content)
}

pub fn session_line(state: &SessionState) -> String {
    match state {
        SessionState::Idle => "-- idle".to_string(),
        SessionState::Running {
            project: Some(project),
        } => format!("-- scanning {}", project),
        SessionState::Running { project: None } => "-- scanning".to_string(),
        SessionState::Errored { cause } => format!("-- start failed: {}", cause),
    }
}

/// Line to print for a controller update, if any. Appended entries print as
/// log lines; stream housekeeping prints as `--` notices.
pub fn update_line(update: &ControllerUpdate) -> Option<String> {
    match update {
        ControllerUpdate::Session {
            state,
            error: Some(error),
            ..
        } if !matches!(state, SessionState::Errored { .. }) => {
            Some(format!("{} (backend: {})", session_line(state), error))
        }
        ControllerUpdate::Session { state, .. } => Some(session_line(state)),
        ControllerUpdate::Stream(StreamUpdate::Appended(entry)) => Some(entry_line(entry)),
        ControllerUpdate::Stream(StreamUpdate::Opened { .. }) => {
            Some("-- live log connected".to_string())
        }
        ControllerUpdate::Stream(StreamUpdate::ReconnectScheduled { delay, reason, .. }) => {
            let what = match reason {
                CloseReason::OpenFailed(_) => "live log unreachable",
                CloseReason::Ended => "live log disconnected",
            };
            Some(format!(
                "-- {}, retrying in {:.1}s",
                what,
                delay.as_secs_f64()
            ))
        }
        ControllerUpdate::Stream(StreamUpdate::Reconnecting { .. })
        | ControllerUpdate::Stream(StreamUpdate::Stale { .. }) => None,
    }
}

pub fn project_rows(projects: &[Project]) -> Vec<String> {
    let mut rows = vec![format!("{:<6} {:<32} {}", "ID", "NAME", "CREATED")];
    rows.extend(projects.iter().map(|project| {
        format!(
            "{:<6} {:<32} {}",
            project.id,
            project.name,
            project.created_at.as_deref().unwrap_or("-")
        )
    }));
    rows
}

pub fn vulnerability_rows(vulnerabilities: &[Vulnerability]) -> Vec<String> {
    let mut rows = vec![format!(
        "{:<6} {:<8} {:<12} {:<7} {:<16} {}",
        "ID", "SEVERITY", "TYPE", "METHOD", "PARAMETER", "URL"
    )];
    rows.extend(vulnerabilities.iter().map(|vuln| {
        format!(
            "{:<6} {:<8} {:<12} {:<7} {:<16} {}",
            vuln.id,
            vuln.severity.as_deref().unwrap_or("-"),
            vuln.vuln_type,
            vuln.method.as_deref().unwrap_or("-"),
            vuln.parameter.as_deref().unwrap_or("-"),
            vuln.url
        )
    }));
    rows
}

pub fn agent_log_rows(logs: &[AgentLog]) -> Vec<String> {
    let mut rows = vec![format!(
        "{:<6} {:<20} {:<14} {}",
        "ID", "TIME", "AGENT", "RESPONSE"
    )];
    rows.extend(logs.iter().map(|log| {
        format!(
            "{:<6} {:<20} {:<14} {}",
            log.id,
            log.timestamp.as_deref().unwrap_or("-"),
            log.agent_name,
            preview(log.response.as_deref().unwrap_or(""))
        )
    }));
    rows
}

fn preview(text: &str) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= PREVIEW_CHARS {
        return flattened;
    }
    let mut cut: String = flattened.chars().take(PREVIEW_CHARS - 1).collect();
    cut.push('…');
    cut
}
