// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Result, bail};
use rusqlite::Connection;
use std::thread;
use std::time::Duration;

use crate::syncer::{self, SyncOptions, SyncOutcome};
use crate::utils::{get_setting, pretty_table, set_setting};
use crate::webdav::transport_from_settings;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("setup", sub)) => setup(conn, sub),
        Some(("run", _)) => run_manual(conn),
        Some(("watch", sub)) => watch(conn, sub),
        Some(("status", _)) => status(conn),
        _ => Ok(()),
    }
}

fn setup(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    set_setting(conn, "webdav_url", sub.get_one::<String>("url").unwrap().trim())?;
    set_setting(conn, "webdav_user", sub.get_one::<String>("user").unwrap().trim())?;
    set_setting(
        conn,
        "webdav_password",
        sub.get_one::<String>("password").unwrap(),
    )?;
    let auto = *sub.get_one::<bool>("auto").unwrap();
    set_setting(conn, "auto_sync", if auto { "1" } else { "0" })?;
    if let Some(name) = sub.get_one::<String>("device_name") {
        set_setting(conn, "device_name", name.trim())?;
    }
    println!("Sync endpoint configured (auto: {})", auto);
    Ok(())
}

/// Manual trigger: missing credentials are an explicit error here, unlike
/// the automatic path where they just disable the feature.
fn run_manual(conn: &mut Connection) -> Result<()> {
    let Some(transport) = transport_from_settings(conn)? else {
        bail!("Sync is not configured; run 'kassenbuch sync setup' first");
    };
    let outcome = syncer::run_sync(conn, &transport, SyncOptions::manual())?;
    report(&outcome);
    Ok(())
}

/// Recurring timer loop. An in-flight attempt always runs to completion;
/// stopping the loop only prevents future attempts.
fn watch(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let interval = *sub.get_one::<u64>("interval").unwrap();
    let enabled = get_setting(conn, "auto_sync")?.as_deref() == Some("1");
    if !enabled {
        bail!("Automatic sync is disabled; run 'kassenbuch sync setup --auto true'");
    }
    println!("Watching every {}s (Ctrl-C to stop)", interval);
    loop {
        match transport_from_settings(conn)? {
            Some(transport) => {
                match syncer::run_sync(conn, &transport, SyncOptions::automatic()) {
                    Ok(outcome) => report(&outcome),
                    // Errors end the attempt; the next tick is the retry.
                    Err(err) => eprintln!("sync: {:#}", err),
                }
            }
            None => report(&SyncOutcome::Disabled),
        }
        thread::sleep(Duration::from_secs(interval));
    }
}

fn status(conn: &Connection) -> Result<()> {
    let keys = [
        ("State", "sync_state"),
        ("Last error", "last_sync_error"),
        ("Last sync", "last_sync_at"),
        ("Last upload", "last_upload_at"),
        ("Last hash", "last_backup_hash"),
        ("Endpoint", "webdav_url"),
        ("User id", "user_id"),
        ("Device id", "device_id"),
        ("Auto sync", "auto_sync"),
    ];
    let mut data = Vec::new();
    for (label, key) in keys {
        let value = get_setting(conn, key)?.unwrap_or_default();
        data.push(vec![label.to_string(), value]);
    }
    println!("{}", pretty_table(&["Field", "Value"], data));
    Ok(())
}

fn report(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Disabled => println!("sync: disabled (no credentials)"),
        SyncOutcome::Busy => println!("sync: another attempt is in flight"),
        SyncOutcome::NoOp => println!("sync: nothing to do"),
        SyncOutcome::RateLimited => println!("sync: skipped by rate limit"),
        SyncOutcome::Uploaded { filename } => println!("sync: uploaded {}", filename),
        SyncOutcome::Restored { filename } => println!("sync: restored {}", filename),
        SyncOutcome::ConflictRestored { filename } => {
            println!("sync: conflict resolved, restored {}", filename)
        }
    }
}
