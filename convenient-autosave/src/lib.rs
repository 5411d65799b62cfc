//! Convenient Autosave - rolling backups of a live game save
//!
//! Watches one save file that a running (multiplayer) game keeps rewriting and
//! snapshots it into a backup directory whenever it changes, so a crashed or
//! corrupted save can be recovered without stopping the game.
//!
//! ## Architecture
//!
//! 1. **Signature Tracker** ([`signature`]): cheap size + mtime fingerprint
//!    (optionally content hash) deciding *when* a backup is needed
//! 2. **Metadata Extractor** ([`metadata`]): player tag and in-game date
//!    deciding *what to name it*
//! 3. **Snapshot Writer** ([`snapshot`]): atomic temp-file-and-rename copy
//! 4. **Retention Manager** ([`retention`]): in-game-year window deciding
//!    *what to keep*
//! 5. **Monitor Loop** ([`monitor`]): drives 1-4 on a timer and listens for
//!    control signals
//!
//! The backup directory is the only state that outlives a session. The
//! filename convention in [`backup`] is the contract between 3 and 4.
//!
//! ## Usage
//!
//! ```no_run
//! use convenient_autosave::{ControlSignal, Monitor, MonitorConfig, RetentionPolicy};
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MonitorConfig::new("saves/mp_autosave.eu4", "saves/backups")
//!     .with_poll_interval(Duration::from_secs(30))
//!     .with_retention(RetentionPolicy::KeepLastYears(50));
//!
//! let (event_tx, mut event_rx) = mpsc::unbounded_channel();
//! let (control_tx, mut control_rx) = mpsc::channel(4);
//!
//! tokio::spawn(async move {
//!     while let Some(event) = event_rx.recv().await {
//!         println!("{event:?}");
//!     }
//! });
//!
//! let mut monitor = Monitor::new(config, event_tx)?;
//! # control_tx.send(ControlSignal::Exit).await?;
//! let reason = monitor.run(&mut control_rx).await;
//! # let _ = reason;
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod config;
pub mod metadata;
pub mod monitor;
pub mod retention;
pub mod signature;
pub mod snapshot;

pub use backup::BackupEntry;
pub use config::{ConfigError, MonitorConfig};
pub use metadata::{ExtractionError, GameDate, SaveMetadata, extract};
pub use monitor::{
    ControlSignal, ErrorKind, Monitor, MonitorEvent, MonitorState, PollOutcome, StopReason,
    WatchTarget,
};
pub use retention::{
    PruneFailure, PruneReport, RetentionError, RetentionPolicy, list_backups, plan_prune, prune,
    remove_entries,
};
pub use signature::{FileSignature, SignatureError, SignatureMode, compute_signature};
pub use snapshot::{SnapshotError, snapshot};
