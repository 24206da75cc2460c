//! Wire types for the Aegis scanner backend.
//!
//! The backend owns these shapes. This crate mirrors the subset the console
//! depends on so the controller and the CLI decode responses the same way.
//! Log frames are the one place where decoding is allowed to fail softly:
//! callers fall back to treating the raw payload as plain text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const STATUS_PATH: &str = "/scanner/status";
pub const START_PATH: &str = "/scanner/start";
pub const STOP_PATH: &str = "/scanner/stop";
pub const LOG_STREAM_PATH: &str = "/scanner/ws/logs";
pub const PROJECTS_PATH: &str = "/projects/";
pub const VULNERABILITIES_PATH: &str = "/vulnerabilities/";
pub const SETTINGS_PATH: &str = "/settings/";

pub const MAX_SETTING_KEY_LEN: usize = 128;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Idle,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StatusReport {
    pub status: ScanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Map<String, Value>>,
    /// Reported by newer backends that track the active project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

impl StatusReport {
    pub fn is_running(&self) -> bool {
        self.status == ScanStatus::Running
    }
}

/// Body returned by start, stop, delete and settings updates.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct CommandAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body of a non-2xx response. FastAPI style backends put the reason
/// in `detail`, which may be a string or a structured validation list.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn describe(&self) -> Option<String> {
        match &self.detail {
            Some(Value::String(text)) if !text.trim().is_empty() => return Some(text.clone()),
            Some(Value::Null) | None => {}
            Some(other) => return Some(other.to_string()),
        }
        self.message
            .as_ref()
            .filter(|text| !text.trim().is_empty())
            .cloned()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    /// Maps the backend's level names onto the four levels the console shows.
    /// The backend logger also emits `DEBUG`, `TRACE` and `CRITICAL`.
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => LogLevel::Success,
            "WARNING" | "WARN" => LogLevel::Warning,
            "ERROR" | "CRITICAL" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One message on the live log feed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LogFrame {
    pub time: String,
    pub level: String,
    pub content: String,
}

impl LogFrame {
    pub fn level(&self) -> LogLevel {
        LogLevel::from_wire(&self.level)
    }
}

pub fn parse_log_frame(payload: &str) -> Result<LogFrame, ErrorInfo> {
    serde_json::from_str(payload).map_err(|err| {
        ErrorInfo::new(
            "invalid_frame",
            format!("log frame is not a structured entry: {}", err),
        )
    })
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Vulnerability {
    pub id: i64,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub request_id: Option<String>,
    pub vuln_type: String,
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub full_request: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub found_at: Option<String>,
}

/// One LLM-agent exchange recorded while auditing a request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AgentLog {
    pub id: i64,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub request_id: Option<String>,
    pub agent_name: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SettingsUpdate {
    pub configs: Map<String, Value>,
}

/// Parses a `KEY=VALUE` assignment for a settings update.
///
/// Values that read as JSON scalars (`true`, `42`, `0.5`, `null`) keep their
/// type; anything else is sent as a string.
pub fn parse_setting_assignment(input: &str) -> Result<(String, Value), ErrorInfo> {
    let (key, raw) = input.split_once('=').ok_or_else(|| {
        ErrorInfo::new(
            "invalid_setting",
            format!("expected KEY=VALUE, got {:?}", input),
        )
    })?;

    let key = key.trim();
    if key.is_empty() {
        return Err(ErrorInfo::new("invalid_setting", "setting key is required"));
    }
    if key.len() > MAX_SETTING_KEY_LEN {
        return Err(ErrorInfo::new(
            "invalid_setting",
            format!(
                "setting key must be {} characters or fewer",
                MAX_SETTING_KEY_LEN
            ),
        ));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(ErrorInfo::new(
            "invalid_setting",
            "setting key must not contain whitespace",
        ));
    }

    let value = match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::Null)) => value,
        _ => Value::String(raw.to_string()),
    };

    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_structured_frame() {
        let frame = parse_log_frame(r#"{"time":"12:00:01","level":"SUCCESS","content":"found"}"#)
            .expect("frame");
        assert_eq!(frame.time, "12:00:01");
        assert_eq!(frame.level(), LogLevel::Success);
        assert_eq!(frame.content, "found");
    }

    #[test]
    fn rejects_plain_text_frame() {
        let err = parse_log_frame("scanner warming up").unwrap_err();
        assert_eq!(err.code, "invalid_frame");
    }

    #[test]
    fn rejects_frame_missing_content() {
        assert!(parse_log_frame(r#"{"time":"12:00:01","level":"INFO"}"#).is_err());
    }

    #[test]
    fn maps_backend_levels() {
        assert_eq!(LogLevel::from_wire("info"), LogLevel::Info);
        assert_eq!(LogLevel::from_wire("DEBUG"), LogLevel::Info);
        assert_eq!(LogLevel::from_wire("TRACE"), LogLevel::Info);
        assert_eq!(LogLevel::from_wire("WARNING"), LogLevel::Warning);
        assert_eq!(LogLevel::from_wire("CRITICAL"), LogLevel::Error);
        assert_eq!(LogLevel::from_wire("something-new"), LogLevel::Info);
    }

    #[test]
    fn status_report_tolerates_components() {
        let report: StatusReport = serde_json::from_str(
            r#"{"status":"running","components":{"proxy":"running","executor":"stopped"}}"#,
        )
        .expect("status");
        assert!(report.is_running());
        assert_eq!(report.project, None);
    }

    #[test]
    fn rejects_unknown_status() {
        assert!(serde_json::from_str::<StatusReport>(r#"{"status":"paused"}"#).is_err());
    }

    #[test]
    fn error_body_prefers_detail() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"detail":"project busy","message":"ignored"}"#)
                .expect("body");
        assert_eq!(body.describe().as_deref(), Some("project busy"));

        let body: ErrorBody = serde_json::from_str(r#"{"message":"fallback"}"#).expect("body");
        assert_eq!(body.describe().as_deref(), Some("fallback"));

        let body: ErrorBody = serde_json::from_str("{}").expect("body");
        assert_eq!(body.describe(), None);
    }

    #[test]
    fn setting_assignment_keeps_scalar_types() {
        let (key, value) = parse_setting_assignment("MAX_WORKERS=4").expect("assignment");
        assert_eq!(key, "MAX_WORKERS");
        assert_eq!(value, Value::from(4));

        let (_, value) = parse_setting_assignment("DEBUG=true").expect("assignment");
        assert_eq!(value, Value::Bool(true));

        let (_, value) = parse_setting_assignment("MODEL=gpt-4o").expect("assignment");
        assert_eq!(value, Value::String("gpt-4o".to_string()));

        let (_, value) = parse_setting_assignment("PROXY=").expect("assignment");
        assert_eq!(value, Value::String(String::new()));
    }

    #[test]
    fn setting_assignment_requires_key() {
        assert!(parse_setting_assignment("=value").is_err());
        assert!(parse_setting_assignment("no-equals").is_err());
        assert!(parse_setting_assignment("BAD KEY=1").is_err());
    }
}
