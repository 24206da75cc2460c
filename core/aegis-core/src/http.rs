//! REST client for the scanner backend.
//!
//! Covers the scanner commands the controller needs plus the read-mostly
//! endpoints the console lists (projects, vulnerabilities, agent logs,
//! settings). Non-2xx responses become `ConsoleError::Backend` carrying the
//! backend's own explanation when it sends one.

use aegis_protocol::{
    AgentLog, CommandAck, ErrorBody, Project, SettingsUpdate, StatusReport, Vulnerability,
    PROJECTS_PATH, SETTINGS_PATH, START_PATH, STATUS_PATH, STOP_PATH, VULNERABILITIES_PATH,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::Url;

use crate::backend::ScannerBackend;
use crate::config::ConsoleConfig;
use crate::error::{ConsoleError, Result};
use crate::session::{project_lookup_name, ProjectName};

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(config: &ConsoleConfig) -> Result<Self> {
        let base = config.api_url()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|source| ConsoleError::Http {
                context: "building HTTP client".to_string(),
                source,
            })?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let url = self.endpoint(PROJECTS_PATH)?;
        self.send(self.client.get(url), "list projects").await
    }

    pub async fn delete_project(&self, project_id: i64) -> Result<CommandAck> {
        let url = self.endpoint(&format!("{}{}", PROJECTS_PATH, project_id))?;
        self.send(self.client.delete(url), "delete project").await
    }

    pub async fn project_vulnerabilities(&self, project: &str) -> Result<Vec<Vulnerability>> {
        let project = project_lookup_name(project)?;
        let url = self.endpoint(&format!("{}{}/vulnerabilities", PROJECTS_PATH, project))?;
        self.send(self.client.get(url), "list project vulnerabilities")
            .await
    }

    pub async fn project_agent_logs(&self, project: &str) -> Result<Vec<AgentLog>> {
        let project = project_lookup_name(project)?;
        let url = self.endpoint(&format!("{}{}/logs", PROJECTS_PATH, project))?;
        self.send(self.client.get(url), "list project agent logs")
            .await
    }

    pub async fn all_vulnerabilities(&self) -> Result<Vec<Vulnerability>> {
        let url = self.endpoint(VULNERABILITIES_PATH)?;
        self.send(self.client.get(url), "list vulnerabilities").await
    }

    pub async fn settings(&self) -> Result<Map<String, Value>> {
        let url = self.endpoint(SETTINGS_PATH)?;
        self.send(self.client.get(url), "read settings").await
    }

    pub async fn update_settings(&self, update: &SettingsUpdate) -> Result<CommandAck> {
        let url = self.endpoint(SETTINGS_PATH)?;
        self.send(self.client.post(url).json(update), "update settings")
            .await
    }

    /// Appends `path` below the base URL. Each segment is percent-encoded;
    /// a trailing `/` is kept because the backend routes collections that way.
    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| ConsoleError::InvalidUrl {
                url: self.base.to_string(),
                details: "base URL cannot carry a path".to_string(),
            })?;
            segments.pop_if_empty();
            segments.extend(path.trim_start_matches('/').split('/'));
        }
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<T> {
        let response = request.send().await.map_err(|source| ConsoleError::Http {
            context: context.to_string(),
            source,
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|source| ConsoleError::Http {
            context: context.to_string(),
            source,
        })?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(|body| body.describe())
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unexpected status")
                        .to_string()
                });
            tracing::debug!(context, status = status.as_u16(), %message, "Backend returned error");
            return Err(ConsoleError::Backend {
                context: context.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&body).map_err(|err| ConsoleError::Decode {
            context: context.to_string(),
            details: err.to_string(),
        })
    }
}

#[async_trait]
impl ScannerBackend for HttpBackend {
    async fn status(&self) -> Result<StatusReport> {
        let url = self.endpoint(STATUS_PATH)?;
        self.send(self.client.get(url), "scanner status").await
    }

    async fn start(&self, project: &ProjectName) -> Result<CommandAck> {
        let url = self.endpoint(START_PATH)?;
        let request = self
            .client
            .post(url)
            .query(&[("project_name", project.as_str())]);
        self.send(request, "start scanner").await
    }

    async fn stop(&self) -> Result<CommandAck> {
        let url = self.endpoint(STOP_PATH)?;
        self.send(self.client.post(url), "stop scanner").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        let config = ConsoleConfig::default().with_overrides(Some(base.to_string()), None);
        HttpBackend::new(&config).expect("backend")
    }

    #[test]
    fn endpoints_extend_base_path() {
        let backend = backend("http://127.0.0.1:8000/api");
        assert_eq!(
            backend.endpoint(STATUS_PATH).expect("url").as_str(),
            "http://127.0.0.1:8000/api/scanner/status"
        );
        assert_eq!(
            backend.endpoint(PROJECTS_PATH).expect("url").as_str(),
            "http://127.0.0.1:8000/api/projects/"
        );
    }

    #[test]
    fn endpoints_tolerate_trailing_slash_in_base() {
        let backend = backend("http://scanner/api/");
        assert_eq!(
            backend.endpoint(STOP_PATH).expect("url").as_str(),
            "http://scanner/api/scanner/stop"
        );
    }

    #[test]
    fn project_segments_are_encoded() {
        let backend = backend("http://scanner/api");
        let project = ProjectName::parse("测试").expect("project");
        let url = backend
            .endpoint(&format!("{}{}/logs", PROJECTS_PATH, project))
            .expect("url");
        assert_eq!(
            url.as_str(),
            "http://scanner/api/projects/%E6%B5%8B%E8%AF%95/logs"
        );
    }

    #[test]
    fn lookup_names_with_spaces_are_encoded() {
        let backend = backend("http://scanner/api");
        let project = project_lookup_name("my shop").expect("lookup");
        let url = backend
            .endpoint(&format!("{}{}/vulnerabilities", PROJECTS_PATH, project))
            .expect("url");
        assert_eq!(
            url.as_str(),
            "http://scanner/api/projects/my%20shop/vulnerabilities"
        );
    }

    #[tokio::test]
    async fn lookup_rejects_path_separator_before_request() {
        // Nothing listens on port 9; only validation can answer.
        let backend = backend("http://127.0.0.1:9/api");
        let err = backend
            .project_agent_logs("a/b")
            .await
            .expect_err("separator rejected");
        assert!(matches!(err, ConsoleError::InvalidProjectName { .. }));
    }

    #[test]
    fn rejects_non_http_base() {
        let config =
            ConsoleConfig::default().with_overrides(Some("ws://scanner/api".to_string()), None);
        assert!(HttpBackend::new(&config).is_err());
    }
}
