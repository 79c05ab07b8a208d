// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::{TxKind, check_amount_kind};
use crate::utils::pretty_table;
use anyhow::Result;
use rusqlite::Connection;
use rust_decimal::Decimal;

pub fn handle(conn: &Connection) -> Result<()> {
    let mut rows = Vec::new();

    // 1) Transfers whose target equals the source account
    let mut stmt = conn.prepare(
        "SELECT uuid FROM transactions WHERE target_account_id IS NOT NULL
         AND target_account_id = account_id",
    )?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let uuid: String = r.get(0)?;
        rows.push(vec!["transfer_self_target".into(), uuid]);
    }

    // 2) Transfer kind without a target leg, or a target without transfer kind
    let mut stmt2 = conn.prepare(
        "SELECT uuid FROM transactions
         WHERE (kind='transfer' AND target_account_id IS NULL)
            OR (kind!='transfer' AND target_account_id IS NOT NULL)",
    )?;
    let mut cur2 = stmt2.query([])?;
    while let Some(r) = cur2.next()? {
        let uuid: String = r.get(0)?;
        rows.push(vec!["transfer_leg_mismatch".into(), uuid]);
    }

    // 3) Amount sign disagreeing with the kind
    let mut stmt3 = conn.prepare("SELECT uuid, kind, amount FROM transactions")?;
    let mut cur3 = stmt3.query([])?;
    while let Some(r) = cur3.next()? {
        let uuid: String = r.get(0)?;
        let kind: String = r.get(1)?;
        let amount: String = r.get(2)?;
        match (TxKind::parse(&kind), amount.parse::<Decimal>()) {
            (Ok(kind), Ok(amount)) => {
                if check_amount_kind(kind, amount).is_err() {
                    rows.push(vec!["kind_sign_mismatch".into(), uuid]);
                }
            }
            _ => rows.push(vec!["unreadable_transaction".into(), uuid]),
        }
    }

    // 4) Accounts pointing at a vanished group
    let mut stmt4 = conn.prepare(
        "SELECT name FROM accounts WHERE group_id IS NOT NULL
         AND group_id NOT IN (SELECT id FROM account_groups)",
    )?;
    let mut cur4 = stmt4.query([])?;
    while let Some(r) = cur4.next()? {
        let name: String = r.get(0)?;
        rows.push(vec!["dangling_group".into(), name]);
    }

    if rows.is_empty() {
        println!("doctor: no issues found");
    } else {
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}
