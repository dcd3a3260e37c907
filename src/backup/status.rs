//! Colored progress lines for whoever watches the terminal.
//!
//! These go to stdout next to the `tracing` log.

use chrono::{DateTime, TimeZone};
use colored::{ColoredString, Colorize};
use std::fmt::Display;
use std::path::Path;

static NEXT_RUN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn print(line: ColoredString) {
    println!("{line}");
}

pub fn backing_up(source: &Path) -> ColoredString {
    format!("Backing up {}...", source.display()).blue()
}

pub fn archive_created(archive: &Path) -> ColoredString {
    format!("Backup created successfully! Archive saved to {}", archive.display()).green()
}

pub fn archive_failed<E: Display>(source: &Path, error: E) -> ColoredString {
    format!("Backup of {} failed: {error}", source.display()).red()
}

pub fn encrypting(archive: &Path) -> ColoredString {
    format!("Encrypting {}...", archive.display()).blue()
}

pub fn encrypted(archive: &Path) -> ColoredString {
    format!("Archive encrypted successfully! Saved to {}", archive.display()).green()
}

pub fn encrypt_failed<E: Display>(archive: &Path, error: E) -> ColoredString {
    format!("Encrypting {} failed: {error}", archive.display()).red()
}

pub fn notification_sent() -> ColoredString {
    "Message sent to Discord successfully!".green()
}

pub fn notification_failed<E: Display>(error: E) -> ColoredString {
    format!("Error sending message to Discord: {error}").red()
}

pub fn sweeping(output_dir: &Path) -> ColoredString {
    format!("Cleaning up old backups in {}...", output_dir.display()).blue()
}

pub fn sweep_nothing() -> ColoredString {
    "No old backups found. Cleanup not needed.".green()
}

pub fn sweep_failed<E: Display>(error: E) -> ColoredString {
    format!("Error cleaning up old backups: {error}").red()
}

pub fn sweep_done(deleted: usize, removed_dirs: usize) -> ColoredString {
    format!("Cleanup removed {deleted} old archive(s) and {removed_dirs} empty dir(s)").green()
}

pub fn next_run<Tz: TimeZone>(at: &DateTime<Tz>) -> ColoredString
where
    Tz::Offset: Display,
{
    format!("Next backup will run at {}", at.format(NEXT_RUN_FORMAT)).cyan()
}
