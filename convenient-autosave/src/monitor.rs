//! The polling loop
//!
//! A [`Monitor`] owns the watch target and walks this state machine:
//!
//! ```text
//! Idle --start--> Polling --signature changed--> Detecting --done--> Polling
//!                    |                                                 |
//!                    +---------------- control signal ----------------+--> Stopped
//! ```
//!
//! [`Monitor::run`] selects between the control channel and the poll timer.
//! The detection sequence (extract, snapshot, prune) runs to completion inside
//! the timer branch, so a stop request is honoured only between cycles and an
//! in-flight snapshot is never cut short.
//!
//! Every outcome, good or bad, is reported as a [`MonitorEvent`]. Per-cycle
//! errors never end the loop.

use crate::backup::BackupEntry;
use crate::config::{ConfigError, MonitorConfig};
use crate::metadata;
use crate::retention::{self, PruneReport};
use crate::signature::{self, FileSignature, SignatureError};
use crate::snapshot;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Control input delivered to a running monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Stop monitoring and hand control back to the caller's menu
    ReturnToMenu,
    /// Stop monitoring and exit
    Exit,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A return-to-menu signal arrived
    ReturnToMenu,
    /// An exit signal arrived or the control channel closed
    Exit,
}

/// Monitor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    /// Created, not monitoring yet
    Idle,
    /// Waiting for the next poll
    Polling,
    /// Change seen, backup sequence running
    Detecting,
    /// Session over
    Stopped,
}

/// Error taxonomy reported in [`MonitorEvent::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The watched file is absent; polling continues
    NotFound,
    /// The save could not be read for metadata; retried on the next change
    Extraction,
    /// A filesystem write, read or delete failed; retried on the next poll
    Io,
    /// The session was given an invalid configuration
    Config,
}

/// Status event for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// Monitoring began
    Started {
        /// Watched save
        source: PathBuf,
        /// Backup directory
        backup_dir: PathBuf,
        /// Seconds between polls
        poll_interval_secs: f64,
        /// Retention policy in config notation
        retention: String,
    },
    /// A poll found the save unchanged
    Unchanged,
    /// A poll found a new signature
    ChangeDetected {
        /// Size of the save in bytes
        size: u64,
    },
    /// A backup was written
    BackupWritten {
        /// The new backup
        entry: BackupEntry,
    },
    /// A backup fell outside the retention window and was deleted
    EntryPruned {
        /// The deleted backup
        entry: BackupEntry,
    },
    /// A temp file from an interrupted snapshot was removed
    TempSwept {
        /// Removed file
        path: PathBuf,
    },
    /// Something failed; the loop carries on
    Error {
        /// Error class
        kind: ErrorKind,
        /// Human-readable cause
        reason: String,
    },
    /// Monitoring ended
    Stopped {
        /// Why
        reason: StopReason,
    },
}

/// Result of a single poll cycle
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Signature matched the last one
    Unchanged,
    /// The save does not exist
    SourceMissing,
    /// A backup was written
    BackedUp(BackupEntry),
    /// The cycle was abandoned
    Skipped(ErrorKind),
    /// The monitor is stopped and did not poll
    Stopped,
}

/// The watched file and its last recorded signature
#[derive(Debug, Clone)]
pub struct WatchTarget {
    /// Save file path
    pub path: PathBuf,
    /// Signature recorded after the last handled change
    pub last_signature: Option<FileSignature>,
}

#[derive(Debug, Clone)]
struct EventSink(mpsc::UnboundedSender<MonitorEvent>);

impl EventSink {
    fn emit(&self, event: MonitorEvent) {
        // Nobody listening is fine
        let _ = self.0.send(event);
    }

    fn error(&self, kind: ErrorKind, reason: impl std::fmt::Display) {
        self.emit(MonitorEvent::Error {
            kind,
            reason: reason.to_string(),
        });
    }
}

/// Save file monitor for one session
pub struct Monitor {
    config: MonitorConfig,
    target: WatchTarget,
    state: MonitorState,
    stop_reason: Option<StopReason>,
    events: EventSink,
}

impl Monitor {
    /// Create a monitor in the [`MonitorState::Idle`] state
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from [`MonitorConfig::validate`]; the error
    /// is also sent as a [`MonitorEvent::Error`].
    pub fn new(config: MonitorConfig, events: mpsc::UnboundedSender<MonitorEvent>) -> Result<Self, ConfigError> {
        let events = EventSink(events);
        if let Err(e) = config.validate() {
            events.error(ErrorKind::Config, &e);
            return Err(e);
        }

        Ok(Self {
            target: WatchTarget {
                path: config.source.clone(),
                last_signature: None,
            },
            config,
            state: MonitorState::Idle,
            stop_reason: None,
            events,
        })
    }

    /// Current state
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Session configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Watched file and last recorded signature
    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// Begin monitoring: sweep stale temp files and record the current
    /// signature as the baseline, so only later changes trigger backups
    ///
    /// Does nothing unless the monitor is idle.
    pub fn start(&mut self) {
        if self.state != MonitorState::Idle {
            return;
        }

        match snapshot::sweep_temp_files(&self.config.backup_dir) {
            Ok(removed) => {
                for path in removed {
                    info!("Removed stale temp file {}", path.display());
                    self.events.emit(MonitorEvent::TempSwept { path });
                }
            }
            Err(e) => {
                debug!("Could not sweep {}: {e}", self.config.backup_dir.display());
                self.events.error(ErrorKind::Io, e);
            }
        }

        self.target.last_signature = match signature::compute_signature(&self.target.path, self.config.signature_mode) {
            Ok(sig) => Some(sig),
            Err(e) => {
                self.report_signature_error(&e);
                None
            }
        };

        info!(
            "Monitoring {} every {:?}, backups in {}",
            self.config.source.display(),
            self.config.poll_interval,
            self.config.backup_dir.display()
        );
        self.events.emit(MonitorEvent::Started {
            source: self.config.source.clone(),
            backup_dir: self.config.backup_dir.clone(),
            poll_interval_secs: self.config.poll_interval.as_secs_f64(),
            retention: self.config.retention.to_string(),
        });
        self.state = MonitorState::Polling;
    }

    /// Enter [`MonitorState::Stopped`]
    pub fn stop(&mut self, reason: StopReason) {
        if self.state == MonitorState::Stopped {
            return;
        }
        info!("Monitoring stopped ({reason:?})");
        self.state = MonitorState::Stopped;
        self.stop_reason = Some(reason);
        self.events.emit(MonitorEvent::Stopped { reason });
    }

    /// Run until a control signal arrives
    ///
    /// Starts the session if still idle. A closed control channel counts as
    /// [`ControlSignal::Exit`]. Returns immediately on a stopped monitor.
    pub async fn run(&mut self, control: &mut mpsc::Receiver<ControlSignal>) -> StopReason {
        if let Some(reason) = self.stop_reason {
            return reason;
        }
        self.start();

        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                signal = control.recv() => {
                    let reason = match signal {
                        Some(ControlSignal::ReturnToMenu) => StopReason::ReturnToMenu,
                        Some(ControlSignal::Exit) | None => StopReason::Exit,
                    };
                    self.stop(reason);
                    return reason;
                }

                _ = ticker.tick() => {
                    let outcome = self.poll_once().await;
                    debug!("Poll finished: {outcome:?}");
                }
            }
        }
    }

    /// Run exactly one poll cycle
    ///
    /// Starts the session if still idle.
    pub async fn poll_once(&mut self) -> PollOutcome {
        match self.state {
            MonitorState::Stopped => return PollOutcome::Stopped,
            MonitorState::Idle => self.start(),
            MonitorState::Polling | MonitorState::Detecting => {}
        }

        let path = self.target.path.clone();
        let mode = self.config.signature_mode;
        let current = match tokio::task::spawn_blocking(move || signature::compute_signature(&path, mode)).await {
            Ok(Ok(sig)) => sig,
            Ok(Err(e)) => {
                self.report_signature_error(&e);
                return match e {
                    SignatureError::NotFound(_) => PollOutcome::SourceMissing,
                    SignatureError::Io { .. } => PollOutcome::Skipped(ErrorKind::Io),
                };
            }
            Err(e) => {
                self.events.error(ErrorKind::Io, format!("signature task failed: {e}"));
                return PollOutcome::Skipped(ErrorKind::Io);
            }
        };

        if self.target.last_signature.as_ref() == Some(&current) {
            debug!("No change: {current}");
            self.events.emit(MonitorEvent::Unchanged);
            return PollOutcome::Unchanged;
        }

        info!("Change detected: {current}");
        self.events.emit(MonitorEvent::ChangeDetected { size: current.size });
        self.state = MonitorState::Detecting;

        let config = self.config.clone();
        let events = self.events.clone();
        let outcome = match tokio::task::spawn_blocking(move || backup_sequence(&config, &events)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.events.error(ErrorKind::Io, format!("backup task failed: {e}"));
                PollOutcome::Skipped(ErrorKind::Io)
            }
        };

        // Io failures are retried next poll, everything else waits for the next change
        if outcome != PollOutcome::Skipped(ErrorKind::Io) {
            self.target.last_signature = Some(current);
        }
        self.state = MonitorState::Polling;
        outcome
    }

    fn report_signature_error(&self, e: &SignatureError) {
        let kind = match e {
            SignatureError::NotFound(_) => ErrorKind::NotFound,
            SignatureError::Io { .. } => ErrorKind::Io,
        };
        debug!("{e}");
        self.events.error(kind, e);
    }
}

/// Extract, snapshot and prune; each stage runs only if the previous one
/// succeeded. Prune problems do not undo a written backup.
fn backup_sequence(config: &MonitorConfig, events: &EventSink) -> PollOutcome {
    let metadata = match metadata::extract(&config.source) {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("Skipping backup, could not read save metadata: {e}");
            events.error(ErrorKind::Extraction, e);
            return PollOutcome::Skipped(ErrorKind::Extraction);
        }
    };

    let entry = match snapshot::snapshot(&config.source, &config.backup_dir, &metadata) {
        Ok(entry) => entry,
        Err(e) => {
            debug!("Backup failed: {e}");
            events.error(ErrorKind::Io, e);
            return PollOutcome::Skipped(ErrorKind::Io);
        }
    };
    events.emit(MonitorEvent::BackupWritten { entry: entry.clone() });

    match retention::prune(&config.backup_dir, &config.retention) {
        Ok(report) => report_prune(events, report),
        Err(e) => {
            debug!("Prune failed: {e}");
            events.error(ErrorKind::Io, e);
        }
    }

    PollOutcome::BackedUp(entry)
}

/// Deleted entries become [`MonitorEvent::EntryPruned`], failed ones Io errors
fn report_prune(events: &EventSink, report: PruneReport) {
    for deleted in report.deleted {
        events.emit(MonitorEvent::EntryPruned { entry: deleted });
    }
    for failure in report.failed {
        events.error(
            ErrorKind::Io,
            format!("could not delete {}: {}", failure.entry.path.display(), failure.reason),
        );
    }
}
