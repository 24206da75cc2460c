//! One-shot commands: scanner control without the live log, plus the
//! project, findings and settings endpoints.

use aegis_core::{ConsoleConfig, HttpBackend, ProjectName, Result, ScannerBackend};
use aegis_protocol::{CommandAck, SettingsUpdate};
use serde_json::Value;

use crate::render;

pub async fn status(config: &ConsoleConfig) -> Result<()> {
    let backend = HttpBackend::new(config)?;
    let report = backend.status().await?;

    let mut line = format!(
        "scanner: {}",
        if report.is_running() { "running" } else { "idle" }
    );
    if let Some(project) = &report.project {
        line.push_str(&format!(" ({})", project));
    }
    println!("{}", line);

    if let Some(components) = &report.components {
        for (name, state) in components {
            let state = state.as_str().map(str::to_owned).unwrap_or_else(|| state.to_string());
            println!("  {:<16} {}", name, state);
        }
    }
    Ok(())
}

pub async fn start(config: &ConsoleConfig, project: Option<String>) -> Result<()> {
    let raw = project.unwrap_or_else(|| config.default_project.clone());
    let project = ProjectName::parse(&raw)?;
    let backend = HttpBackend::new(config)?;
    let ack = backend.start(&project).await?;
    tracing::info!(project = %project, "Scan started");
    print_ack(&ack, &format!("started scan for {}", project));
    Ok(())
}

pub async fn stop(config: &ConsoleConfig) -> Result<()> {
    let backend = HttpBackend::new(config)?;
    let ack = backend.stop().await?;
    tracing::info!("Scan stopped");
    print_ack(&ack, "scanner stopped");
    Ok(())
}

pub async fn list_projects(config: &ConsoleConfig) -> Result<()> {
    let backend = HttpBackend::new(config)?;
    let projects = backend.list_projects().await?;
    if projects.is_empty() {
        println!("no projects yet");
        return Ok(());
    }
    print_rows(render::project_rows(&projects));
    Ok(())
}

pub async fn delete_project(config: &ConsoleConfig, project_id: i64) -> Result<()> {
    let backend = HttpBackend::new(config)?;
    let ack = backend.delete_project(project_id).await?;
    tracing::info!(project_id, "Project deleted");
    print_ack(&ack, &format!("deleted project {}", project_id));
    Ok(())
}

pub async fn project_vulnerabilities(config: &ConsoleConfig, name: &str) -> Result<()> {
    let backend = HttpBackend::new(config)?;
    let findings = backend.project_vulnerabilities(name).await?;
    if findings.is_empty() {
        println!("no findings for {}", name);
        return Ok(());
    }
    print_rows(render::vulnerability_rows(&findings));
    Ok(())
}

pub async fn project_agent_logs(config: &ConsoleConfig, name: &str) -> Result<()> {
    let backend = HttpBackend::new(config)?;
    let logs = backend.project_agent_logs(name).await?;
    if logs.is_empty() {
        println!("no agent activity for {}", name);
        return Ok(());
    }
    print_rows(render::agent_log_rows(&logs));
    Ok(())
}

pub async fn all_vulnerabilities(config: &ConsoleConfig) -> Result<()> {
    let backend = HttpBackend::new(config)?;
    let findings = backend.all_vulnerabilities().await?;
    if findings.is_empty() {
        println!("no findings");
        return Ok(());
    }
    print_rows(render::vulnerability_rows(&findings));
    Ok(())
}

pub async fn show_settings(config: &ConsoleConfig) -> Result<()> {
    let backend = HttpBackend::new(config)?;
    let settings = backend.settings().await?;
    let rendered = serde_json::to_string_pretty(&Value::Object(settings)).map_err(|err| {
        aegis_core::ConsoleError::Decode {
            context: "settings".to_string(),
            details: err.to_string(),
        }
    })?;
    println!("{}", rendered);
    Ok(())
}

pub async fn update_settings(
    config: &ConsoleConfig,
    assignments: Vec<(String, Value)>,
) -> Result<()> {
    let update = SettingsUpdate {
        configs: assignments.into_iter().collect(),
    };
    let keys: Vec<&str> = update.configs.keys().map(String::as_str).collect();
    tracing::info!(keys = ?keys, "Updating backend settings");

    let backend = HttpBackend::new(config)?;
    let ack = backend.update_settings(&update).await?;
    print_ack(&ack, &format!("updated {} setting(s)", update.configs.len()));
    Ok(())
}

fn print_ack(ack: &CommandAck, fallback: &str) {
    match ack.message.as_deref().filter(|message| !message.trim().is_empty()) {
        Some(message) => println!("{}", message),
        None => println!("{}", fallback),
    }
}

fn print_rows(rows: Vec<String>) {
    for row in rows {
        println!("{}", row);
    }
}
