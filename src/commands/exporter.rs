// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::utils::fmt_amount;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("transactions", sub)) => export_transactions(conn, sub),
        _ => Ok(()),
    }
}

/// Writes the German bank-style CSV: Buchungstag,Kategorie,V-Zweck,Betrag.
fn export_transactions(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let out = sub.get_one::<String>("out").unwrap().trim();

    let mut stmt = conn.prepare(
        "SELECT t.date, IFNULL(c.name,''), t.memo, t.amount
         FROM transactions t
         LEFT JOIN categories c ON t.category_id=c.id
         ORDER BY t.date, t.id",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
        ))
    })?;

    let mut wtr = csv::Writer::from_path(out).with_context(|| format!("Open {}", out))?;
    wtr.write_record(["Buchungstag", "Kategorie", "V-Zweck", "Betrag"])?;
    for row in rows {
        let (date, category, memo, amount) = row?;
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .with_context(|| format!("Invalid stored date '{}'", date))?;
        let amount = amount
            .parse::<Decimal>()
            .with_context(|| format!("Invalid stored amount '{}'", amount))?;
        wtr.write_record([
            date.format("%d.%m.%Y").to_string(),
            category,
            memo,
            fmt_amount(&amount),
        ])?;
    }
    wtr.flush()?;
    println!("Exported transactions to {}", out);
    Ok(())
}
