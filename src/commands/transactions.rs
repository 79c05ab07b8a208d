// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::matcher::Matcher;
use crate::models::{TxKind, check_amount_kind};
use crate::utils::{
    ensure_category, fmt_amount, id_for_account, id_for_category, maybe_print_json, parse_date,
    parse_decimal, pretty_table,
};
use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("transfer", sub)) => transfer(conn, sub)?,
        Some(("edit", sub)) => edit(conn, sub)?,
        Some(("rm", sub)) => rm(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn add(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let date = parse_date(sub.get_one::<String>("date").unwrap())?;
    let account_name = sub.get_one::<String>("account").unwrap().trim();
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap().trim())?;
    let memo = sub
        .get_one::<String>("memo")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let exclude = sub.get_flag("exclude");

    let account_id = id_for_account(conn, account_name)?;

    let (category_id, kind) = match sub.get_one::<String>("category") {
        Some(cat) => {
            let kind = match sub.get_one::<String>("kind") {
                Some(k) => TxKind::parse(k)?,
                None => TxKind::from_sign(amount),
            };
            (Some(id_for_category(conn, cat.trim())?), kind)
        }
        None => {
            let mut matcher = Matcher::load(conn)?;
            let suggestion = matcher.classify(&memo, amount);
            if let Some(rule_id) = suggestion.rule_id {
                matcher.record_usage(conn, rule_id)?;
            }
            let kind = match sub.get_one::<String>("kind") {
                Some(k) => TxKind::parse(k)?,
                None => suggestion.kind,
            };
            println!("Categorized as '{}'", suggestion.category);
            (Some(ensure_category(conn, &suggestion.category)?), kind)
        }
    };
    check_amount_kind(kind, amount)?;

    let uuid = uuid::Uuid::new_v4().to_string();
    let user_id = crate::utils::get_setting(conn, "user_id")?.unwrap_or_default();
    conn.execute(
        "INSERT INTO transactions(uuid, account_id, category_id, kind, amount, date, memo,
                                  exclude_from_balance, user_id, last_modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            uuid,
            account_id,
            category_id,
            kind.as_str(),
            amount.to_string(),
            date.to_string(),
            memo,
            exclude,
            user_id,
            Utc::now().timestamp()
        ],
    )?;
    println!(
        "Recorded {} on {} at '{}' ({})",
        fmt_amount(&amount),
        date,
        account_name,
        uuid
    );
    Ok(())
}

fn transfer(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let date = parse_date(sub.get_one::<String>("date").unwrap())?;
    let from = sub.get_one::<String>("from").unwrap().trim();
    let to = sub.get_one::<String>("to").unwrap().trim();
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap().trim())?;
    let memo = sub
        .get_one::<String>("memo")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    // The transfer leg invariant: rejected before anything is persisted.
    if from == to {
        bail!("Transfer source and target account must differ ('{}')", from);
    }
    let from_id = id_for_account(conn, from)?;
    let to_id = id_for_account(conn, to)?;

    let uuid = uuid::Uuid::new_v4().to_string();
    let user_id = crate::utils::get_setting(conn, "user_id")?.unwrap_or_default();
    conn.execute(
        "INSERT INTO transactions(uuid, account_id, target_account_id, kind, amount, date, memo,
                                  user_id, last_modified)
         VALUES (?1, ?2, ?3, 'transfer', ?4, ?5, ?6, ?7, ?8)",
        params![
            uuid,
            from_id,
            to_id,
            amount.to_string(),
            date.to_string(),
            memo,
            user_id,
            Utc::now().timestamp()
        ],
    )?;
    println!(
        "Transferred {} from '{}' to '{}' on {}",
        fmt_amount(&amount),
        from,
        to,
        date
    );
    Ok(())
}

/// Edits preserve the transaction's identity: the UUID never changes.
fn edit(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let uuid = sub.get_one::<String>("uuid").unwrap().trim();
    let existing: Option<(String, String)> = conn
        .query_row(
            "SELECT amount, kind FROM transactions WHERE uuid=?1",
            params![uuid],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let (old_amount, old_kind) =
        existing.ok_or_else(|| anyhow!("Transaction '{}' not found", uuid))?;

    let amount = match sub.get_one::<String>("amount") {
        Some(a) => parse_decimal(a.trim())?,
        None => parse_decimal(&old_amount)?,
    };
    let kind = match sub.get_one::<String>("kind") {
        Some(k) => TxKind::parse(k)?,
        None => TxKind::parse(&old_kind)?,
    };
    if kind == TxKind::Transfer && sub.get_one::<String>("kind").is_some() {
        bail!("Cannot change a transaction into a transfer; create one instead");
    }
    check_amount_kind(kind, amount)?;

    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE transactions SET amount=?1, kind=?2, last_modified=?3 WHERE uuid=?4",
        params![amount.to_string(), kind.as_str(), Utc::now().timestamp(), uuid],
    )?;
    if let Some(date) = sub.get_one::<String>("date") {
        let date = parse_date(date)?;
        tx.execute(
            "UPDATE transactions SET date=?1 WHERE uuid=?2",
            params![date.to_string(), uuid],
        )?;
    }
    if let Some(cat) = sub.get_one::<String>("category") {
        let cat_id = id_for_category(&tx, cat.trim())?;
        tx.execute(
            "UPDATE transactions SET category_id=?1 WHERE uuid=?2",
            params![cat_id, uuid],
        )?;
    }
    if let Some(memo) = sub.get_one::<String>("memo") {
        tx.execute(
            "UPDATE transactions SET memo=?1 WHERE uuid=?2",
            params![memo.trim(), uuid],
        )?;
    }
    if let Some(exclude) = sub.get_one::<bool>("exclude") {
        tx.execute(
            "UPDATE transactions SET exclude_from_balance=?1 WHERE uuid=?2",
            params![exclude, uuid],
        )?;
    }
    tx.commit()?;
    println!("Updated transaction {}", uuid);
    Ok(())
}

fn rm(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let uuid = sub.get_one::<String>("uuid").unwrap().trim();
    let n = conn.execute("DELETE FROM transactions WHERE uuid=?1", params![uuid])?;
    if n == 0 {
        bail!("Transaction '{}' not found", uuid);
    }
    println!("Removed transaction {}", uuid);
    Ok(())
}

#[derive(Serialize)]
pub struct TransactionRow {
    pub uuid: String,
    pub date: String,
    pub account: String,
    pub kind: String,
    pub amount: String,
    pub category: String,
    pub memo: String,
    pub target: String,
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");
    let data = query_rows(conn, sub)?;
    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.date.clone(),
                    r.account.clone(),
                    r.kind.clone(),
                    r.amount.clone(),
                    r.category.clone(),
                    r.memo.clone(),
                    r.target.clone(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["Date", "Account", "Kind", "Amount", "Category", "Memo", "Target"],
                rows,
            )
        );
    }
    Ok(())
}

pub fn query_rows(conn: &Connection, sub: &clap::ArgMatches) -> Result<Vec<TransactionRow>> {
    let mut sql = String::from(
        "SELECT t.uuid, t.date, a.name, t.kind, t.amount, c.name, t.memo, ta.name
         FROM transactions t
         LEFT JOIN accounts a ON t.account_id=a.id
         LEFT JOIN accounts ta ON t.target_account_id=ta.id
         LEFT JOIN categories c ON t.category_id=c.id WHERE 1=1",
    );
    let mut params_vec: Vec<String> = Vec::new();

    if let Some(month) = sub.get_one::<String>("month") {
        sql.push_str(" AND substr(t.date,1,7)=?");
        params_vec.push(month.into());
    }
    if let Some(acct) = sub.get_one::<String>("account") {
        sql.push_str(" AND a.name=?");
        params_vec.push(acct.into());
    }
    if let Some(cat) = sub.get_one::<String>("category") {
        sql.push_str(" AND c.name=?");
        params_vec.push(cat.into());
    }
    sql.push_str(" ORDER BY t.date DESC, t.id DESC");
    if let Some(limit) = sub.get_one::<usize>("limit") {
        sql.push_str(" LIMIT ?");
        params_vec.push(limit.to_string());
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = if params_vec.is_empty() {
        stmt.query([])?
    } else {
        let params: Vec<&dyn rusqlite::ToSql> = params_vec
            .iter()
            .map(|s| s as &dyn rusqlite::ToSql)
            .collect();
        stmt.query(rusqlite::params_from_iter(params))?
    };

    let mut data = Vec::new();
    while let Some(r) = rows.next()? {
        let uuid: String = r.get(0)?;
        let date: String = r.get(1)?;
        let account: Option<String> = r.get(2)?;
        let kind: String = r.get(3)?;
        let amount: String = r.get(4)?;
        let category: Option<String> = r.get(5)?;
        let memo: String = r.get(6)?;
        let target: Option<String> = r.get(7)?;
        data.push(TransactionRow {
            uuid,
            date,
            account: account.unwrap_or_default(),
            kind,
            amount,
            category: category.unwrap_or_default(),
            memo,
            target: target.unwrap_or_default(),
        });
    }
    Ok(data)
}
