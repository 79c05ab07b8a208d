// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::utils::{id_for_category, pretty_table};
use anyhow::Result;
use rusqlite::{Connection, params};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap().trim();
            let next: i64 = conn.query_row(
                "SELECT IFNULL(MAX(sort_order)+1, 0) FROM categories",
                [],
                |r| r.get(0),
            )?;
            conn.execute(
                "INSERT INTO categories(name, sort_order) VALUES (?1, ?2)",
                params![name, next],
            )?;
            println!("Added category '{}'", name);
        }
        Some(("list", _)) => {
            let mut stmt =
                conn.prepare("SELECT name, sort_order FROM categories ORDER BY sort_order, name")?;
            let rows = stmt.query_map([], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
            })?;
            let mut data = Vec::new();
            for row in rows {
                let (n, o) = row?;
                data.push(vec![o.to_string(), n]);
            }
            println!("{}", pretty_table(&["Order", "Category"], data));
        }
        Some(("rm", sub)) => {
            let name = sub.get_one::<String>("name").unwrap().trim();
            // Referencing transactions keep their records; the category
            // reference becomes NULL via the foreign key.
            conn.execute("DELETE FROM categories WHERE name=?1", params![name])?;
            println!("Removed category '{}'", name);
        }
        Some(("reorder", sub)) => {
            let name = sub.get_one::<String>("name").unwrap().trim();
            let position = *sub.get_one::<i64>("position").unwrap();
            let id = id_for_category(conn, name)?;
            conn.execute(
                "UPDATE categories SET sort_order=?1 WHERE id=?2",
                params![position, id],
            )?;
            println!("Moved category '{}' to position {}", name, position);
        }
        _ => {}
    }
    Ok(())
}
