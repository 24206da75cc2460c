//! Live console: scanner control plus the streaming scan log.
//!
//! Runs the controller event loop alongside stdin commands and Ctrl-C. All
//! controller calls happen on this one task.

use aegis_core::{
    ConsoleConfig, ControllerOptions, ControllerUpdate, HttpBackend, PendingCommand,
    ScanController, SessionState, WsConnector,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::render;

type LiveController = ScanController<HttpBackend, WsConnector>;

pub struct WatchOptions {
    pub project: String,
    pub start: bool,
    pub stop_on_exit: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum ConsoleCommand {
    Start(Option<String>),
    Stop,
    Status,
    Logs,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), rest.as_slice()) {
        ("start", []) => ConsoleCommand::Start(None),
        ("start", [project]) => ConsoleCommand::Start(Some(project.to_string())),
        ("stop", []) => ConsoleCommand::Stop,
        ("status", []) => ConsoleCommand::Status,
        ("logs", []) => ConsoleCommand::Logs,
        ("help" | "?", []) => ConsoleCommand::Help,
        ("quit" | "exit" | "q", []) => ConsoleCommand::Quit,
        (other, _) => return Err(format!("unknown command {:?} (try `help`)", other)),
    };
    Ok(Some(command))
}

pub async fn run(config: &ConsoleConfig, options: WatchOptions) -> aegis_core::Result<()> {
    let backend = Arc::new(HttpBackend::new(config)?);
    let connector = Arc::new(WsConnector::new(config)?);
    tracing::info!(
        api = %backend.base_url(),
        stream = %connector.url(),
        "Console starting"
    );

    let mut controller = ScanController::new(backend, connector, ControllerOptions::from(config));
    controller.initialize()?;
    println!("-- checking scanner status...");

    let mut start_after_probe = options.start;
    let mut quitting = false;
    let mut stdin_open = true;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            update = controller.step() => {
                let Some(update) = update else { break };
                if let Some(line) = render::update_line(&update) {
                    println!("{}", line);
                }

                let probe_finished = matches!(
                    &update,
                    ControllerUpdate::Session { command: Some(PendingCommand::Probe), .. }
                );
                if probe_finished && start_after_probe {
                    start_after_probe = false;
                    if !controller.state().is_running() {
                        issue_start(&mut controller, &options.project);
                    }
                }
                if quitting && finish_quit(&mut controller, options.stop_on_exit) {
                    break;
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match parse_command(&line) {
                        Ok(Some(ConsoleCommand::Quit)) => {
                            quitting = true;
                            if finish_quit(&mut controller, options.stop_on_exit) {
                                break;
                            }
                        }
                        Ok(Some(command)) => handle_command(&mut controller, command, &options.project),
                        Ok(None) => {}
                        Err(message) => println!("-- {}", message),
                    },
                    Ok(None) => stdin_open = false,
                    Err(err) => {
                        tracing::warn!(error = %err, "Failed to read console input");
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if quitting {
                    tracing::warn!("Second interrupt; exiting without waiting");
                    break;
                }
                quitting = true;
                if finish_quit(&mut controller, options.stop_on_exit) {
                    break;
                }
                println!("-- waiting for the scanner to stop (Ctrl-C again to force)");
            }
        }
    }

    tracing::info!(state = %controller.state(), "Console exiting");
    Ok(())
}

/// Returns true once it is safe to exit. With `stop_on_exit` a running scan
/// is stopped first and the loop waits for the stop to complete.
fn finish_quit(controller: &mut LiveController, stop_on_exit: bool) -> bool {
    if controller.is_busy() {
        return false;
    }
    if stop_on_exit && controller.state().is_running() {
        return match controller.stop() {
            Ok(()) => false,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to stop scanner on exit");
                true
            }
        };
    }
    true
}

fn issue_start(controller: &mut LiveController, project: &str) {
    match controller.start(project) {
        Ok(project) => println!("-- starting scan for {}", project),
        Err(err) => println!("-- {}", err),
    }
}

fn handle_command(controller: &mut LiveController, command: ConsoleCommand, default_project: &str) {
    match command {
        ConsoleCommand::Start(project) => {
            issue_start(controller, project.as_deref().unwrap_or(default_project))
        }
        ConsoleCommand::Stop => match controller.stop() {
            Ok(()) => println!("-- stopping scan"),
            Err(err) => println!("-- {}", err),
        },
        ConsoleCommand::Status => {
            println!("{}", render::session_line(controller.state()));
            if let Some(pending) = controller.in_flight() {
                println!("-- waiting on {}", pending);
            }
            let supervisor = controller.supervisor();
            if controller.state().is_running() {
                let link = if supervisor.connection_live() {
                    "connected"
                } else if supervisor.reconnect_pending() {
                    "waiting to reconnect"
                } else {
                    "connecting"
                };
                println!(
                    "-- live log {} (attempts: {}, buffered: {})",
                    link,
                    supervisor.connect_attempts(),
                    controller.buffer().len()
                );
            }
        }
        ConsoleCommand::Logs => {
            for entry in controller.buffer().iter() {
                println!("{}", render::entry_line(entry));
            }
        }
        ConsoleCommand::Help => {
            println!("-- commands: start [project] | stop | status | logs | quit");
        }
        ConsoleCommand::Quit => {}
    }

    if let SessionState::Errored { cause } = controller.state() {
        tracing::debug!(%cause, "Last start attempt failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_console_commands() {
        assert_eq!(parse_command("   "), Ok(None));
        assert_eq!(parse_command("start"), Ok(Some(ConsoleCommand::Start(None))));
        assert_eq!(
            parse_command("START shop"),
            Ok(Some(ConsoleCommand::Start(Some("shop".to_string()))))
        );
        assert_eq!(parse_command("stop"), Ok(Some(ConsoleCommand::Stop)));
        assert_eq!(parse_command(" q "), Ok(Some(ConsoleCommand::Quit)));
        assert_eq!(parse_command("?"), Ok(Some(ConsoleCommand::Help)));
    }

    #[test]
    fn rejects_unknown_or_overlong_commands() {
        assert!(parse_command("restart").is_err());
        assert!(parse_command("start a b").is_err());
        assert!(parse_command("stop now").is_err());
    }
}
