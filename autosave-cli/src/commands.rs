//! One-shot commands working on the backup directory

use crate::cli::SettingsOverrides;
use crate::settings::Settings;
use convenient_autosave::{BackupEntry, MonitorConfig, extract, list_backups, plan_prune, prune as apply_retention};
use std::path::Path;

type CommandResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

fn load_config(settings_path: &Path, overrides: &SettingsOverrides) -> Result<MonitorConfig, Box<dyn std::error::Error + Send + Sync>> {
    let config = Settings::load(settings_path)?.with_overrides(overrides)?.to_config()?;
    config.validate()?;
    Ok(config)
}

fn print_entry(entry: &BackupEntry) {
    println!(
        "  {:<8} {:>10}  {}  {}",
        entry.player_tag,
        entry.game_date.to_string(),
        entry.captured_at.format("%Y-%m-%d %H:%M:%S%.3f"),
        entry.path.display()
    );
}

/// Show every backup, oldest first
pub fn list(settings_path: &Path, overrides: &SettingsOverrides) -> CommandResult {
    let config = load_config(settings_path, overrides)?;
    let backups = list_backups(&config.backup_dir)?;

    println!("Backups in {}", config.backup_dir.display());
    println!();
    if backups.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for entry in &backups {
        print_entry(entry);
    }
    println!();
    println!("{} backup(s)", backups.len());

    Ok(())
}

/// Apply the retention policy once
pub fn prune(settings_path: &Path, overrides: &SettingsOverrides, dry_run: bool) -> CommandResult {
    let config = load_config(settings_path, overrides)?;
    println!("Retention: {} in-game year(s)", config.retention);
    println!();

    if dry_run {
        let backups = list_backups(&config.backup_dir)?;
        let doomed = plan_prune(&backups, &config.retention);
        if doomed.is_empty() {
            println!("Nothing to delete");
        } else {
            println!("Would delete:");
            for entry in &doomed {
                print_entry(entry);
            }
        }
        return Ok(());
    }

    let report = apply_retention(&config.backup_dir, &config.retention)?;
    if report.deleted.is_empty() && report.failed.is_empty() {
        println!("Nothing to delete");
        return Ok(());
    }
    if !report.deleted.is_empty() {
        println!("Deleted:");
        for entry in &report.deleted {
            print_entry(entry);
        }
    }
    if !report.failed.is_empty() {
        println!("Could not delete:");
        for failure in &report.failed {
            println!("  {}: {}", failure.entry.path.display(), failure.reason);
        }
        return Err(format!("{} backup(s) could not be deleted", report.failed.len()).into());
    }

    Ok(())
}

/// Print what a backup of `file` would be named
pub fn inspect(file: &Path) -> CommandResult {
    let metadata = extract(file)?;
    let entry = BackupEntry::for_metadata(Path::new("."), &metadata);

    println!("Save:     {}", file.display());
    println!("Player:   {}", metadata.player_tag());
    println!("Date:     {}", metadata.game_date());
    println!("Backup:   {}", entry.file_name());

    Ok(())
}
