// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Evaluation data for charts and summaries: plain aggregates honoring the
//! balance flags — excluded transactions never count, accounts with
//! `include_in_balance` off are left out of group totals, and neutral or
//! transfer movements stay out of income/expense figures.

use crate::utils::{maybe_print_json, pretty_table};
use anyhow::{Context, Result};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("balances", sub)) => balances(conn, sub)?,
        Some(("monthly", sub)) => monthly(conn, sub)?,
        Some(("by-category", sub)) => by_category(conn, sub)?,
        _ => {}
    }
    Ok(())
}

#[derive(Serialize)]
pub struct BalanceRow {
    pub account: String,
    pub group: String,
    pub balance: String,
    pub in_totals: bool,
}

fn balances(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");

    let mut stmt = conn.prepare(
        "SELECT a.name, IFNULL(g.name,''), a.include_in_balance,
                IFNULL((SELECT SUM(CAST(t.amount AS REAL)) FROM transactions t
                        WHERE t.account_id=a.id AND t.exclude_from_balance=0), 0)
         FROM accounts a LEFT JOIN account_groups g ON a.group_id=g.id
         GROUP BY a.id ORDER BY a.sort_order, a.name",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, bool>(2)?,
            r.get::<_, f64>(3)?,
        ))
    })?;

    let mut data = Vec::new();
    let mut total = Decimal::ZERO;
    for row in rows {
        let (account, group, in_totals, bal_f) = row?;
        let balance = Decimal::try_from(bal_f)
            .with_context(|| format!("Invalid balance '{}' for account {}", bal_f, account))?;
        if in_totals {
            total += balance;
        }
        data.push(BalanceRow {
            account,
            group,
            balance: format!("{:.2}", balance),
            in_totals,
        });
    }

    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        let mut rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.account.clone(),
                    r.group.clone(),
                    r.balance.clone(),
                    if r.in_totals { "yes".into() } else { "no".into() },
                ]
            })
            .collect();
        rows.push(vec![
            "TOTAL".into(),
            String::new(),
            format!("{:.2}", total),
            String::new(),
        ]);
        println!(
            "{}",
            pretty_table(&["Account", "Group", "Balance", "In totals"], rows)
        );
    }
    Ok(())
}

fn monthly(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");
    let months: usize = *sub.get_one::<usize>("months").unwrap_or(&12);

    // Neutral and transfer movements are neither income nor expense.
    let mut stmt = conn.prepare(
        "SELECT substr(date,1,7) AS month, amount, kind
         FROM transactions
         WHERE exclude_from_balance=0 AND kind IN ('income','expense')
         ORDER BY date DESC",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
        ))
    })?;

    let mut map: BTreeMap<String, (Decimal, Decimal)> = BTreeMap::new();
    for row in rows {
        let (month, amount, kind) = row?;
        let amount = amount
            .parse::<Decimal>()
            .with_context(|| format!("Invalid stored amount '{}'", amount))?;
        let entry = map.entry(month).or_insert((Decimal::ZERO, Decimal::ZERO));
        if kind == "income" {
            entry.0 += amount;
        } else {
            entry.1 += -amount;
        }
    }

    let mut data = Vec::new();
    for (month, (income, expense)) in map.iter().rev().take(months) {
        data.push(vec![
            month.clone(),
            format!("{:.2}", income),
            format!("{:.2}", expense),
        ]);
    }
    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        println!("{}", pretty_table(&["Month", "Income", "Expense"], data));
    }
    Ok(())
}

fn by_category(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");
    let month = sub.get_one::<String>("month").unwrap();

    let mut stmt = conn.prepare(
        "SELECT IFNULL(c.name,'(uncategorized)'), printf('%.2f', -SUM(CAST(t.amount AS REAL))) AS spent
         FROM transactions t LEFT JOIN categories c ON t.category_id=c.id
         WHERE substr(t.date,1,7)=?1 AND t.kind='expense' AND t.exclude_from_balance=0
         GROUP BY c.name ORDER BY spent DESC",
    )?;
    let rows = stmt.query_map([month], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
    })?;
    let mut data = Vec::new();
    for row in rows {
        let (category, spent) = row?;
        data.push(vec![category, spent]);
    }
    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        println!("{}", pretty_table(&["Category", "Spent"], data));
    }
    Ok(())
}
