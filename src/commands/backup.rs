// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::fs;

use crate::snapshot;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("save", sub)) => {
            let out = sub.get_one::<String>("out").unwrap().trim();
            let snap = snapshot::encode(conn)?;
            fs::write(out, snapshot::to_bytes(&snap)?)
                .with_context(|| format!("Write snapshot to {}", out))?;
            println!(
                "Saved snapshot ({} accounts, {} transactions, hash {})",
                snap.accounts.len(),
                snap.transactions.len(),
                &snap.content_hash[..12.min(snap.content_hash.len())]
            );
        }
        Some(("load", sub)) => {
            let path = sub.get_one::<String>("path").unwrap().trim();
            let bytes = fs::read(path).with_context(|| format!("Read snapshot {}", path))?;
            let snap = snapshot::from_bytes(&bytes)?;
            snapshot::restore(conn, &snap)?;
            println!(
                "Restored snapshot v{} ({} accounts, {} transactions)",
                snap.version,
                snap.accounts.len(),
                snap.transactions.len()
            );
        }
        Some(("hash", _)) => {
            let snap = snapshot::encode(conn)?;
            println!("{}", snap.content_hash);
        }
        _ => {}
    }
    Ok(())
}
