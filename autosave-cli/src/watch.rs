//! The `watch` command: monitoring sessions driven from the terminal
//!
//! Typing `r` (or `menu`, or Ctrl+Q followed by Enter) ends the session and
//! starts a fresh one with reloaded settings. `q`, `quit`, `exit` or Ctrl+C
//! end the program.

use crate::cli::WatchArgs;
use crate::settings::{Settings, SettingsError};
use convenient_autosave::{ControlSignal, ErrorKind, Monitor, MonitorConfig, MonitorEvent, StopReason};
use std::io::BufRead;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Control keys recognised on stdin
fn parse_control(line: &str) -> Option<ControlSignal> {
    match line.trim().to_ascii_lowercase().as_str() {
        "r" | "menu" | "\u{11}" => Some(ControlSignal::ReturnToMenu),
        "q" | "quit" | "exit" => Some(ControlSignal::Exit),
        _ => None,
    }
}

/// Forward stdin lines and Ctrl+C to the control channel
fn spawn_control_listeners(tx: mpsc::Sender<ControlSignal>) {
    let stdin_tx = tx.clone();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_control(&line) {
                Some(signal) => {
                    if stdin_tx.blocking_send(signal).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!("Unknown command '{}' (r = restart, q = quit)", line.trim()),
            }
        }
        debug!("Stdin closed, keyboard control disabled");
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(ControlSignal::Exit).await;
        }
        // Keep the channel open for the stdin thread's sake
        std::future::pending::<()>().await;
    });
}

fn session_config(settings_path: &Path, args: &WatchArgs) -> Result<MonitorConfig, SettingsError> {
    let settings = Settings::load(settings_path)?.with_overrides(&args.overrides)?;
    if args.save {
        settings.save(settings_path)?;
        info!("Settings written to {}", settings_path.display());
    }
    let config = settings.to_config()?;
    config.validate()?;
    Ok(config)
}

/// Run monitoring sessions until an exit signal
pub async fn watch(settings_path: &Path, args: WatchArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (control_tx, mut control_rx) = mpsc::channel(8);
    spawn_control_listeners(control_tx);

    let mut first = true;
    loop {
        let config = match session_config(settings_path, &args) {
            Ok(config) => config,
            Err(e) if first => return Err(e.into()),
            Err(e) => {
                error!("{e}");
                info!("Fix the settings and press r to retry, or q to quit");
                match control_rx.recv().await {
                    Some(ControlSignal::ReturnToMenu) => continue,
                    Some(ControlSignal::Exit) | None => break,
                }
            }
        };
        first = false;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(render_events(event_rx, args.json));

        let reason = match Monitor::new(config, event_tx) {
            Ok(mut monitor) => monitor.run(&mut control_rx).await,
            Err(e) => {
                // The Config event has already been rendered
                let _ = printer.await;
                return Err(e.into());
            }
        };
        // The monitor owned the last sender, so the printer drains and ends
        let _ = printer.await;

        match reason {
            StopReason::ReturnToMenu => info!("Restarting with reloaded settings"),
            StopReason::Exit => break,
        }
    }

    Ok(())
}

async fn render_events(mut events: mpsc::UnboundedReceiver<MonitorEvent>, json: bool) {
    while let Some(event) = events.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("Could not serialize event: {e}"),
            }
            continue;
        }

        match event {
            MonitorEvent::Started {
                source,
                backup_dir,
                poll_interval_secs,
                retention,
            } => {
                info!(
                    "Watching {} every {poll_interval_secs}s, backups in {} (keeping {retention} years)",
                    source.display(),
                    backup_dir.display()
                );
                info!("Press r + Enter to restart, q + Enter to quit");
            }
            MonitorEvent::Unchanged => debug!("No change"),
            MonitorEvent::ChangeDetected { size } => debug!("Save changed ({size} bytes)"),
            MonitorEvent::BackupWritten { entry } => info!(
                "Backed up {} at {} -> {}",
                entry.player_tag,
                entry.game_date,
                entry.file_name()
            ),
            MonitorEvent::EntryPruned { entry } => info!("Cleaned up old backup {}", entry.file_name()),
            MonitorEvent::TempSwept { path } => info!("Removed leftover {}", path.display()),
            MonitorEvent::Error {
                kind: ErrorKind::NotFound,
                reason,
            } => warn!("Waiting for save: {reason}"),
            MonitorEvent::Error { kind, reason } => error!("{kind:?}: {reason}"),
            MonitorEvent::Stopped { reason } => info!("Stopped ({reason:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convenient_autosave::ConfigError;
    use tempfile::TempDir;

    #[test]
    fn test_invalid_settings_are_a_settings_error() {
        let tmp = TempDir::new().unwrap();
        let settings_path = tmp.path().join("settings.json");
        let save = tmp.path().join("mp_autosave.eu4");
        let settings = Settings {
            source: Some(save.clone()),
            backup_dir: Some(save),
            ..Settings::default()
        };
        settings.save(&settings_path).unwrap();

        let result = session_config(&settings_path, &WatchArgs::default());
        assert!(matches!(
            result,
            Err(SettingsError::Config(ConfigError::BackupDirIsSource(_)))
        ));
    }

    #[test]
    fn test_parse_control() {
        assert_eq!(parse_control("r"), Some(ControlSignal::ReturnToMenu));
        assert_eq!(parse_control(" MENU \n"), Some(ControlSignal::ReturnToMenu));
        assert_eq!(parse_control("\u{11}"), Some(ControlSignal::ReturnToMenu));
        assert_eq!(parse_control("q"), Some(ControlSignal::Exit));
        assert_eq!(parse_control("Quit"), Some(ControlSignal::Exit));
        assert_eq!(parse_control("exit"), Some(ControlSignal::Exit));
        assert_eq!(parse_control("backup"), None);
        assert_eq!(parse_control(""), None);
    }
}
