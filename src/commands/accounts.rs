// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::utils::{id_for_account, id_for_group, pretty_table};
use anyhow::Result;
use rusqlite::{Connection, params};

pub fn handle_group(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap().trim();
            let icon = sub.get_one::<String>("icon").map(|s| s.trim().to_string());
            let color = sub.get_one::<String>("color").map(|s| s.trim().to_string());
            conn.execute(
                "INSERT INTO account_groups(name, icon, color) VALUES (?1, ?2, ?3)",
                params![name, icon, color],
            )?;
            println!("Added account group '{}'", name);
        }
        Some(("list", _)) => {
            let mut stmt = conn.prepare(
                "SELECT g.name, IFNULL(g.icon,''), IFNULL(g.color,''),
                        (SELECT COUNT(*) FROM accounts a WHERE a.group_id=g.id)
                 FROM account_groups g ORDER BY g.sort_order, g.name",
            )?;
            let rows = stmt.query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(3)?,
                ))
            })?;
            let mut data = Vec::new();
            for row in rows {
                let (n, i, c, count) = row?;
                data.push(vec![n, i, c, count.to_string()]);
            }
            println!(
                "{}",
                pretty_table(&["Group", "Icon", "Color", "Accounts"], data)
            );
        }
        Some(("rm", sub)) => {
            let name = sub.get_one::<String>("name").unwrap().trim();
            let cascade = sub.get_flag("cascade");
            let group_id = id_for_group(conn, name)?;
            // Group deletion cascading to accounts is a business rule, not
            // a storage constraint; without --cascade accounts are ungrouped.
            let tx = conn.transaction()?;
            if cascade {
                tx.execute(
                    "DELETE FROM accounts WHERE group_id=?1",
                    params![group_id],
                )?;
            }
            tx.execute("DELETE FROM account_groups WHERE id=?1", params![group_id])?;
            tx.commit()?;
            println!("Removed account group '{}'", name);
        }
        _ => {}
    }
    Ok(())
}

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap().trim();
            let kind = sub.get_one::<String>("type").unwrap();
            let group_id = match sub.get_one::<String>("group") {
                Some(g) => Some(id_for_group(conn, g.trim())?),
                None => None,
            };
            let icon = sub.get_one::<String>("icon").map(|s| s.trim().to_string());
            let color = sub.get_one::<String>("color").map(|s| s.trim().to_string());
            let include = !sub.get_flag("no_balance");
            conn.execute(
                "INSERT INTO accounts(name, group_id, kind, icon, color, include_in_balance)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![name, group_id, kind, icon, color, include],
            )?;
            println!("Added account '{}' ({})", name, kind);
        }
        Some(("list", _)) => {
            let mut stmt = conn.prepare(
                "SELECT a.name, IFNULL(g.name,''), a.kind, a.include_in_balance
                 FROM accounts a LEFT JOIN account_groups g ON a.group_id=g.id
                 ORDER BY a.sort_order, a.name",
            )?;
            let rows = stmt.query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, bool>(3)?,
                ))
            })?;
            let mut data = Vec::new();
            for row in rows {
                let (n, g, k, inc) = row?;
                data.push(vec![
                    n,
                    g,
                    k,
                    if inc { "yes".into() } else { "no".into() },
                ]);
            }
            println!(
                "{}",
                pretty_table(&["Account", "Group", "Type", "In balance"], data)
            );
        }
        Some(("rm", sub)) => {
            let name = sub.get_one::<String>("name").unwrap().trim();
            conn.execute("DELETE FROM accounts WHERE name=?1", params![name])?;
            println!("Removed account '{}'", name);
        }
        Some(("set-group", sub)) => {
            let name = sub.get_one::<String>("name").unwrap().trim();
            let account_id = id_for_account(conn, name)?;
            let group_id = match sub.get_one::<String>("group") {
                Some(g) => Some(id_for_group(conn, g.trim())?),
                None => None,
            };
            conn.execute(
                "UPDATE accounts SET group_id=?1 WHERE id=?2",
                params![group_id, account_id],
            )?;
            match group_id {
                Some(_) => println!("Moved account '{}'", name),
                None => println!("Ungrouped account '{}'", name),
            }
        }
        _ => {}
    }
    Ok(())
}
