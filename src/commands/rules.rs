// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::matcher::Matcher;
use crate::utils::pretty_table;
use anyhow::Result;
use rusqlite::{Connection, params};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let pattern = sub.get_one::<String>("pattern").unwrap().trim();
            let category = sub.get_one::<String>("category").unwrap().trim();
            let mut matcher = Matcher::load(conn)?;
            let id = matcher.add_rule(conn, pattern, category)?;
            println!("Added rule {}: '{}' -> '{}'", id, pattern, category);
        }
        Some(("list", _)) => {
            let matcher = Matcher::load(conn)?;
            let data: Vec<Vec<String>> = matcher
                .rules()
                .iter()
                .map(|r| {
                    vec![
                        r.id.to_string(),
                        r.pattern.clone(),
                        r.short_form.clone().unwrap_or_default(),
                        r.category.clone(),
                        r.use_count.to_string(),
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(&["ID", "Pattern", "Short form", "Category", "Uses"], data)
            );
        }
        Some(("teach", sub)) => {
            let original = sub.get_one::<String>("original").unwrap();
            let short = sub.get_one::<String>("short").unwrap();
            let category = sub.get_one::<String>("category").unwrap();
            let mut matcher = Matcher::load(conn)?;
            matcher.learn(conn, original, short, category)?;
            println!("Learned '{}' -> '{}' ({})", original.trim(), short.trim(), category.trim());
        }
        Some(("rm", sub)) => {
            let raw = sub.get_one::<String>("id").unwrap();
            let id = raw.trim().parse::<i64>()?;
            conn.execute("DELETE FROM rules WHERE id=?1", params![id])?;
            println!("Removed rule {}", id);
        }
        _ => {}
    }
    Ok(())
}
