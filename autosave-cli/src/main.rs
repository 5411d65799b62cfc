//! Autosave - rolling backups of a live multiplayer save
//!
//! Watches the save the game keeps overwriting and copies it into a backup
//! directory on every change, keeping a configurable window of in-game years.

mod cli;
mod commands;
mod settings;
mod watch;

use clap::Parser;
use cli::{Cli, Commands, WatchArgs};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "autosave=debug,convenient_autosave=debug"
    } else {
        "autosave=info,convenient_autosave=warn"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings_path = cli.settings.unwrap_or_else(settings::default_settings_path);
    tracing::debug!("Settings file: {}", settings_path.display());

    match cli.command.unwrap_or_else(|| Commands::Watch(WatchArgs::default())) {
        Commands::Watch(args) => watch::watch(&settings_path, args).await,
        Commands::List { overrides } => commands::list(&settings_path, &overrides),
        Commands::Prune { overrides, dry_run } => commands::prune(&settings_path, &overrides, dry_run),
        Commands::Inspect { file } => commands::inspect(&file),
    }
}
