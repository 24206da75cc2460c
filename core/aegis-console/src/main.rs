//! aegis-console: terminal front end for the Aegis scanner backend.
//!
//! ## Subcommands
//!
//! - `watch`: live scan log with interactive start/stop
//! - `status`, `start`, `stop`: one-shot scanner control
//! - `projects`, `vulns`: stored projects and findings
//! - `settings`: read or update backend settings

mod commands;
mod logging;
mod render;
mod watch;

use aegis_core::{load_config, ConsoleConfig};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aegis-console")]
#[command(about = "Control Aegis scans and follow their live log")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.aegis/console.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backend API base URL, e.g. http://127.0.0.1:8000/api
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,

    /// Live log WebSocket URL (derived from the API URL when omitted)
    #[arg(long, global = true, value_name = "URL")]
    stream_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the live scan log and control the scanner from stdin
    Watch {
        /// Project used by `start` without an argument
        #[arg(long, value_name = "NAME")]
        project: Option<String>,

        /// Start a scan once the initial status check completes
        #[arg(long)]
        start: bool,

        /// Stop a running scan before exiting
        #[arg(long)]
        stop_on_exit: bool,
    },

    /// Show scanner status
    Status,

    /// Start a scan
    Start {
        #[arg(value_name = "PROJECT")]
        project: Option<String>,
    },

    /// Stop the running scan
    Stop,

    /// Stored projects
    Projects {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// All findings across projects
    Vulns,

    /// Backend settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// List projects
    List,

    /// Delete a project and its findings
    Delete {
        #[arg(value_name = "ID")]
        id: i64,
    },

    /// Findings for one project
    Vulns {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Agent activity for one project
    Logs {
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print current settings
    Get,

    /// Update settings
    Set {
        #[arg(value_name = "KEY=VALUE", required = true, value_parser = parse_assignment)]
        assignments: Vec<(String, Value)>,
    },
}

fn parse_assignment(input: &str) -> Result<(String, Value), String> {
    aegis_protocol::parse_setting_assignment(input).map_err(|err| err.message)
}

fn resolve_config(cli: &Cli) -> aegis_core::Result<ConsoleConfig> {
    let config = load_config(cli.config.clone())?
        .with_env_overrides()
        .with_overrides(cli.api_url.clone(), cli.stream_url.clone());
    // Surface bad URLs before any command runs.
    config.api_url()?;
    config.stream_url()?;
    Ok(config)
}

async fn run(cli: Cli) -> aegis_core::Result<()> {
    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Watch {
            project,
            start,
            stop_on_exit,
        } => {
            let options = watch::WatchOptions {
                project: project.unwrap_or_else(|| config.default_project.clone()),
                start,
                stop_on_exit,
            };
            watch::run(&config, options).await
        }
        Commands::Status => commands::status(&config).await,
        Commands::Start { project } => commands::start(&config, project).await,
        Commands::Stop => commands::stop(&config).await,
        Commands::Projects { command } => match command {
            ProjectCommands::List => commands::list_projects(&config).await,
            ProjectCommands::Delete { id } => commands::delete_project(&config, id).await,
            ProjectCommands::Vulns { name } => {
                commands::project_vulnerabilities(&config, &name).await
            }
            ProjectCommands::Logs { name } => commands::project_agent_logs(&config, &name).await,
        },
        Commands::Vulns => commands::all_vulnerabilities(&config).await,
        Commands::Settings { command } => match command {
            SettingsCommands::Get => commands::show_settings(&config).await,
            SettingsCommands::Set { assignments } => {
                commands::update_settings(&config, assignments).await
            }
        },
    }
}

#[tokio::main]
async fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "aegis-console failed");
        eprintln!("aegis-console: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_settings_assignments() {
        let cli = Cli::try_parse_from([
            "aegis-console",
            "settings",
            "set",
            "MAX_WORKERS=4",
            "MODEL=gpt-4o",
        ])
        .expect("parse");
        match cli.command {
            Commands::Settings {
                command: SettingsCommands::Set { assignments },
            } => {
                assert_eq!(assignments.len(), 2);
                assert_eq!(assignments[0], ("MAX_WORKERS".to_string(), Value::from(4)));
            }
            _ => panic!("expected settings set"),
        }
    }

    #[test]
    fn rejects_malformed_assignment() {
        assert!(Cli::try_parse_from(["aegis-console", "settings", "set", "oops"]).is_err());
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "aegis-console",
            "watch",
            "--start",
            "--api-url",
            "http://scanner:8000/api",
        ])
        .expect("parse");
        assert_eq!(cli.api_url.as_deref(), Some("http://scanner:8000/api"));
        assert!(matches!(cli.command, Commands::Watch { start: true, .. }));
    }
}
