// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Sync orchestrator: decides per attempt whether to download + restore,
//! upload, or do nothing, based on local data presence, the newest remote
//! snapshot, and the persisted sync cursors.
//!
//! One attempt runs at a time; a concurrent trigger is dropped, not
//! queued. The storage endpoint offers no server-side arbitration, so the
//! conflict policy is deliberate and simple: a newer remote snapshot is
//! trusted wholesale, with the conflict logged.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::snapshot;
use crate::utils::{get_setting, get_setting_i64, set_setting};
use crate::webdav::{BackupEntry, RemoteStore, build_backup_filename};

/// Minimum spacing between automatic attempts.
pub const AUTO_ATTEMPT_SPACING_SECS: i64 = 30;
/// Minimum spacing after a successful upload before the next one; breaks
/// upload -> download -> upload feedback loops.
pub const UPLOAD_SPACING_SECS: i64 = 90;

static SYNC_IN_FLIGHT: AtomicBool = AtomicBool::new(false);

struct InFlightGuard;

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        SYNC_IN_FLIGHT.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Checking,
    Downloading,
    Uploading,
    Syncing,
    Error(String),
    Success,
}

impl SyncState {
    pub fn label(&self) -> String {
        match self {
            SyncState::Idle => "idle".to_string(),
            SyncState::Checking => "checking".to_string(),
            SyncState::Downloading => "downloading".to_string(),
            SyncState::Uploading => "uploading".to_string(),
            SyncState::Syncing => "syncing".to_string(),
            SyncState::Error(reason) => format!("error: {}", reason),
            SyncState::Success => "success".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Credentials missing; automatic sync is a disabled feature, not an error.
    Disabled,
    /// Another attempt is in flight; this trigger was dropped.
    Busy,
    /// Nothing to do (no data anywhere, or content hash unchanged).
    NoOp,
    /// Skipped by an attempt- or upload-spacing safeguard.
    RateLimited,
    Uploaded { filename: String },
    Restored { filename: String },
    /// Remote was newer while local had changed too; remote won wholesale.
    ConflictRestored { filename: String },
}

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Manual triggers bypass rate limits but never the in-flight guard.
    pub manual: bool,
    pub now: i64,
}

impl SyncOptions {
    pub fn manual() -> SyncOptions {
        SyncOptions {
            manual: true,
            now: Utc::now().timestamp(),
        }
    }

    pub fn automatic() -> SyncOptions {
        SyncOptions {
            manual: false,
            now: Utc::now().timestamp(),
        }
    }
}

/// Runs one synchronization attempt. Steps are strictly sequential:
/// check local, fetch remote listing, decide, act. Failures end the
/// attempt; the next timer tick or manual trigger is the retry mechanism.
pub fn run_sync(
    conn: &mut Connection,
    remote: &dyn RemoteStore,
    opts: SyncOptions,
) -> Result<SyncOutcome> {
    if SYNC_IN_FLIGHT
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(SyncOutcome::Busy);
    }
    let _guard = InFlightGuard;

    let result = attempt(conn, remote, opts);
    match &result {
        Ok(_) => {
            set_setting(conn, "sync_state", &SyncState::Success.label())?;
            set_setting(conn, "last_sync_error", "")?;
        }
        Err(err) => {
            let reason = format!("{:#}", err);
            set_setting(conn, "sync_state", &SyncState::Error(reason.clone()).label())?;
            set_setting(conn, "last_sync_error", &reason)?;
        }
    }
    result
}

fn attempt(
    conn: &mut Connection,
    remote: &dyn RemoteStore,
    opts: SyncOptions,
) -> Result<SyncOutcome> {
    set_setting(conn, "sync_state", &SyncState::Checking.label())?;

    if !opts.manual {
        let last_attempt = get_setting_i64(conn, "last_attempt_at")?.unwrap_or(0);
        if opts.now - last_attempt < AUTO_ATTEMPT_SPACING_SECS {
            return Ok(SyncOutcome::RateLimited);
        }
    }
    set_setting(conn, "last_attempt_at", &opts.now.to_string())?;

    let local = local_has_data(conn)?;
    let entries = remote.list_backups().context("List remote backups")?;
    let newest = entries.into_iter().max_by_key(|e| e.timestamp);

    match (local, newest) {
        (false, None) => Ok(SyncOutcome::NoOp),
        (false, Some(entry)) => {
            let restored = download_and_restore(conn, remote, &entry, opts.now)?;
            Ok(SyncOutcome::Restored {
                filename: restored,
            })
        }
        (true, None) => maybe_upload(conn, remote, opts),
        (true, Some(entry)) => {
            let last_sync = get_setting_i64(conn, "last_sync_at")?.unwrap_or(0);
            if entry.timestamp > last_sync {
                // Conflict path: remote moved past our last sync point. If
                // local also changed, log it and trust the remote anyway.
                let conflicted = local_changed_since(conn, last_sync)?;
                if conflicted {
                    eprintln!(
                        "sync: conflict — local changes and newer remote '{}'; remote wins",
                        entry.filename
                    );
                }
                let restored = download_and_restore(conn, remote, &entry, opts.now)?;
                if conflicted {
                    Ok(SyncOutcome::ConflictRestored {
                        filename: restored,
                    })
                } else {
                    Ok(SyncOutcome::Restored {
                        filename: restored,
                    })
                }
            } else {
                maybe_upload(conn, remote, opts)
            }
        }
    }
}

fn maybe_upload(
    conn: &mut Connection,
    remote: &dyn RemoteStore,
    opts: SyncOptions,
) -> Result<SyncOutcome> {
    let snap = snapshot::encode(conn).context("Encode snapshot")?;
    let last_hash = get_setting(conn, "last_backup_hash")?.unwrap_or_default();
    if snap.content_hash == last_hash {
        return Ok(SyncOutcome::NoOp);
    }
    if !opts.manual {
        let last_upload = get_setting_i64(conn, "last_upload_at")?.unwrap_or(0);
        if opts.now - last_upload < UPLOAD_SPACING_SECS {
            return Ok(SyncOutcome::RateLimited);
        }
    }

    set_setting(conn, "sync_state", &SyncState::Uploading.label())?;
    let filename = build_backup_filename(&snap.user_id, &snap.device_id, opts.now);
    let body = snapshot::to_bytes(&snap)?;
    remote
        .upload(&filename, body)
        .with_context(|| format!("Upload '{}'", filename))?;

    set_setting(conn, "last_upload_at", &opts.now.to_string())?;
    set_setting(conn, "last_sync_at", &opts.now.to_string())?;
    set_setting(conn, "last_backup_hash", &snap.content_hash)?;
    Ok(SyncOutcome::Uploaded { filename })
}

/// Conflict-resolving restore: full authoritative replacement of the
/// local graph by the downloaded snapshot, atomic via the store
/// transaction, validated before anything is deleted.
fn download_and_restore(
    conn: &mut Connection,
    remote: &dyn RemoteStore,
    entry: &BackupEntry,
    now: i64,
) -> Result<String> {
    set_setting(conn, "sync_state", &SyncState::Downloading.label())?;
    let bytes = remote
        .download(&entry.filename)
        .with_context(|| format!("Download '{}'", entry.filename))?;
    let snap = snapshot::from_bytes(&bytes)?;

    set_setting(conn, "sync_state", &SyncState::Syncing.label())?;
    snapshot::restore(conn, &snap).context("Restore snapshot")?;

    // Hash is recomputed rather than trusted from the file, so a stale or
    // tampered embedded hash cannot poison change detection.
    set_setting(conn, "last_sync_at", &now.to_string())?;
    set_setting(conn, "last_backup_hash", &snapshot::content_hash(&snap))?;
    Ok(entry.filename.clone())
}

pub fn local_has_data(conn: &Connection) -> Result<bool> {
    let accounts: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |r| r.get(0))?;
    let txs: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))?;
    Ok(accounts > 0 || txs > 0)
}

/// True when any transaction was modified after the given sync point.
pub fn local_changed_since(conn: &Connection, since: i64) -> Result<bool> {
    let newest: Option<i64> = conn.query_row(
        "SELECT MAX(last_modified) FROM transactions",
        [],
        |r| r.get(0),
    )?;
    Ok(newest.is_some_and(|m| m > since))
}
