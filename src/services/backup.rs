//! Database backups: `pg_dump -Fc` to a temp file, shipped to the remote
//! object store with rclone, then pruned by per-cadence retention.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::{DateTime, Utc};
use tokio::process::Command;

use crate::db::PoolSettings;

const REMOTE_PREFIX: &str = "pardaaf_backups";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupCadence {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl BackupCadence {
    pub const ALL: [BackupCadence; 4] = [
        BackupCadence::Daily,
        BackupCadence::Weekly,
        BackupCadence::Monthly,
        BackupCadence::Yearly,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            BackupCadence::Daily => "daily",
            BackupCadence::Weekly => "weekly",
            BackupCadence::Monthly => "monthly",
            BackupCadence::Yearly => "yearly",
        }
    }

    /// How many archives to keep per tenant.
    pub fn retention(&self) -> usize {
        match self {
            BackupCadence::Daily => 14,
            BackupCadence::Weekly => 8,
            BackupCadence::Monthly => 12,
            BackupCadence::Yearly => 5,
        }
    }

    /// Backup fire times: daily 00:00, weekly Fri 00:10, monthly 1st
    /// 00:20, yearly Jan 1 00:30 (Asia/Kabul).
    pub fn schedule(&self) -> &'static str {
        match self {
            BackupCadence::Daily => "0 0 0 * * *",
            BackupCadence::Weekly => "0 10 0 * * Fri",
            BackupCadence::Monthly => "0 20 0 1 * *",
            BackupCadence::Yearly => "0 30 0 1 Jan *",
        }
    }

    /// Cleanup runs an hour after the matching backup.
    pub fn cleanup_schedule(&self) -> &'static str {
        match self {
            BackupCadence::Daily => "0 0 1 * * *",
            BackupCadence::Weekly => "0 10 1 * * Fri",
            BackupCadence::Monthly => "0 20 1 1 * *",
            BackupCadence::Yearly => "0 30 1 1 Jan *",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "daily" => Ok(BackupCadence::Daily),
            "weekly" => Ok(BackupCadence::Weekly),
            "monthly" => Ok(BackupCadence::Monthly),
            "yearly" => Ok(BackupCadence::Yearly),
            other => anyhow::bail!("unknown backup cadence: {}", other),
        }
    }
}

pub fn dump_file_name(db_name: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.dump", db_name, at.format("%Y%m%dT%H%M%S"))
}

pub fn remote_dir(remote: &str, db_name: &str, cadence: BackupCadence) -> String {
    format!(
        "{}:{}/{}/{}",
        remote,
        REMOTE_PREFIX,
        db_name,
        cadence.dir_name()
    )
}

pub fn local_dump_path(file_name: &str) -> PathBuf {
    std::env::temp_dir().join(file_name)
}

/// `pg_dump -Fc` the named database to `path`.
pub async fn dump_database(
    settings: &PoolSettings,
    db_name: &str,
    path: &Path,
) -> anyhow::Result<()> {
    let output = Command::new("pg_dump")
        .arg("-Fc")
        .arg("-h")
        .arg(&settings.host)
        .arg("-p")
        .arg(settings.port.to_string())
        .arg("-U")
        .arg(&settings.user)
        .arg("-f")
        .arg(path)
        .arg(db_name)
        .env("PGPASSWORD", &settings.password)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        anyhow::bail!(
            "pg_dump failed for {}: {}",
            db_name,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Ship a finished dump to the remote store.
pub async fn upload_dump(local: &Path, remote_dir: &str, file_name: &str) -> anyhow::Result<()> {
    let output = Command::new("rclone")
        .arg("copyto")
        .arg(local)
        .arg(format!("{}/{}", remote_dir, file_name))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        anyhow::bail!(
            "rclone copyto failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Backup one database end to end; the temp file is removed on every
/// exit path.
pub async fn backup_database(
    settings: &PoolSettings,
    remote: &str,
    db_name: &str,
    cadence: BackupCadence,
) -> anyhow::Result<()> {
    let file_name = dump_file_name(db_name, Utc::now());
    let local = local_dump_path(&file_name);

    let result = run_backup(settings, remote, db_name, cadence, &local, &file_name).await;
    let _ = tokio::fs::remove_file(&local).await;
    result
}

async fn run_backup(
    settings: &PoolSettings,
    remote: &str,
    db_name: &str,
    cadence: BackupCadence,
    local: &Path,
    file_name: &str,
) -> anyhow::Result<()> {
    dump_database(settings, db_name, local).await?;
    upload_dump(local, &remote_dir(remote, db_name, cadence), file_name).await?;
    tracing::info!(db = %db_name, cadence = %cadence.dir_name(), "backup uploaded");
    Ok(())
}

/// Delete remote archives beyond the cadence's retention count.
/// Returns how many were removed.
pub async fn cleanup_remote(
    remote: &str,
    db_name: &str,
    cadence: BackupCadence,
) -> anyhow::Result<usize> {
    let dir = remote_dir(remote, db_name, cadence);
    let output = Command::new("rclone")
        .arg("lsf")
        .arg(&dir)
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        anyhow::bail!(
            "rclone lsf failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let listing = String::from_utf8_lossy(&output.stdout);
    let stale = stale_entries(&listing, cadence.retention());

    for file in &stale {
        let target = format!("{}/{}", dir, file);
        let output = Command::new("rclone")
            .arg("deletefile")
            .arg(&target)
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !output.status.success() {
            tracing::error!(
                "rclone deletefile failed for {}: {}",
                target,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
    }
    Ok(stale.len())
}

/// Dump names sort chronologically, so retention is a suffix keep.
fn stale_entries(listing: &str, keep: usize) -> Vec<String> {
    let mut entries: Vec<String> = listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    entries.sort();
    if entries.len() <= keep {
        return Vec::new();
    }
    let cut = entries.len() - keep;
    entries.truncate(cut);
    entries
}
