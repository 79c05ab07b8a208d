// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Bank CSV import with heuristic categorization and duplicate detection.
//!
//! Every row lands in exactly one of four buckets: imported, skipped
//! (exact duplicate), suspicious (held for review), or errored (malformed
//! input, reported rather than silently dropped). The whole import runs
//! inside one transaction; a persistence failure rolls everything back.

use crate::matcher::Matcher;
use crate::utils::{
    ensure_category, fmt_amount, id_for_account, maybe_print_json, parse_amount_lax, parse_date,
    pretty_table, text_similarity,
};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use csv::ReaderBuilder;
use rusqlite::params;
use rust_decimal::Decimal;
use serde::Serialize;

/// Near-duplicates must fall within this many days of the existing record.
const NEAR_DUPLICATE_DAYS: i64 = 3;
/// Memo similarity at or above this marks a near-duplicate.
const NEAR_DUPLICATE_SIMILARITY: f64 = 0.7;

#[derive(Debug, Clone, Serialize)]
pub struct ImportRowInfo {
    pub row: usize,
    pub date: String,
    pub amount: String,
    pub account: String,
    pub category: String,
    pub memo: String,
    pub suspicious: bool,
    /// Memo of the pre-existing transaction this row collided with.
    pub collided_with: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportErrorInfo {
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ImportSummary {
    pub imported: Vec<ImportRowInfo>,
    pub skipped: Vec<ImportRowInfo>,
    pub suspicious: Vec<ImportRowInfo>,
    pub errored: Vec<ImportErrorInfo>,
}

struct ExistingTx {
    date: NaiveDate,
    amount: Decimal,
    memo: String,
}

pub fn handle(conn: &mut rusqlite::Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("transactions", sub)) => {
            let path = sub.get_one::<String>("path").unwrap().trim();
            let account = sub.get_one::<String>("account").unwrap().trim();
            let accept_suspicious = sub.get_flag("accept_suspicious");
            let summary = import_csv(conn, account, path, accept_suspicious)?;
            let json_flag = sub.get_flag("json");
            let jsonl_flag = sub.get_flag("jsonl");
            if !maybe_print_json(json_flag, jsonl_flag, &summary)? {
                print_summary(&summary);
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Imports a bank CSV export against one account.
///
/// Suspicious rows are held out unless `accept_suspicious` is set; exact
/// duplicates are always skipped.
pub fn import_csv(
    conn: &mut rusqlite::Connection,
    account: &str,
    path: &str,
    accept_suspicious: bool,
) -> Result<ImportSummary> {
    let account_id = id_for_account(conn, account)?;
    let user_id = crate::utils::get_setting(conn, "user_id")?.unwrap_or_default();

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Open CSV {}", path))?;
    let (date_idx, amount_idx, memo_idx) = resolve_columns(rdr.headers()?);

    let mut matcher = Matcher::load(conn)?;

    // Everything already on the account, plus rows accepted earlier in this
    // run, so duplicates inside one file are caught too.
    let mut existing = load_existing(conn, account_id)?;

    let mut summary = ImportSummary::default();
    let mut tx = conn.transaction()?;

    for (i, result) in rdr.records().enumerate() {
        let row_no = i + 2; // 1-based, after the header row
        let rec = match result {
            Ok(rec) => rec,
            Err(err) => {
                summary.errored.push(ImportErrorInfo {
                    row: row_no,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let date_raw = rec.get(date_idx).unwrap_or("").trim();
        let amount_raw = rec.get(amount_idx).unwrap_or("").trim();
        let memo = rec.get(memo_idx).unwrap_or("").trim().to_string();

        let date = match parse_date(date_raw) {
            Ok(d) => d,
            Err(err) => {
                summary.errored.push(ImportErrorInfo {
                    row: row_no,
                    reason: format!("{:#}", err),
                });
                continue;
            }
        };
        let amount = match parse_amount_lax(amount_raw) {
            Ok(a) => a,
            Err(err) => {
                summary.errored.push(ImportErrorInfo {
                    row: row_no,
                    reason: format!("{:#}", err),
                });
                continue;
            }
        };

        let suggestion = matcher.classify(&memo, amount);
        if let Some(rule_id) = suggestion.rule_id {
            matcher.record_usage(&tx, rule_id)?;
        }

        let info = ImportRowInfo {
            row: row_no,
            date: date.to_string(),
            amount: fmt_amount(&amount),
            account: account.to_string(),
            category: suggestion.category.clone(),
            memo: memo.clone(),
            suspicious: false,
            collided_with: None,
        };

        match judge_duplicate(&existing, date, amount, &memo) {
            Judgement::Exact(collision) => {
                summary.skipped.push(ImportRowInfo {
                    collided_with: Some(collision),
                    ..info
                });
                continue;
            }
            Judgement::Near(collision) if !accept_suspicious => {
                summary.suspicious.push(ImportRowInfo {
                    suspicious: true,
                    collided_with: Some(collision),
                    ..info
                });
                continue;
            }
            Judgement::RoundAmount if !accept_suspicious => {
                summary.suspicious.push(ImportRowInfo {
                    suspicious: true,
                    ..info
                });
                continue;
            }
            _ => {}
        }

        // Per-row savepoint: a failing category creation errors this row
        // only, without taking the rest of the batch down.
        let sp = tx.savepoint()?;
        let staged = (|| -> Result<()> {
            let category_id = ensure_category(&sp, &suggestion.category)?;
            sp.execute(
                "INSERT INTO transactions(uuid, account_id, category_id, kind, amount, date, memo,
                                          user_id, last_modified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    account_id,
                    category_id,
                    suggestion.kind.as_str(),
                    amount.to_string(),
                    date.to_string(),
                    memo,
                    user_id,
                    Utc::now().timestamp()
                ],
            )?;
            Ok(())
        })();
        match staged {
            Ok(()) => {
                sp.commit()?;
                existing.push(ExistingTx {
                    date,
                    amount,
                    memo: memo.clone(),
                });
                summary.imported.push(info);
            }
            Err(err) => {
                // Savepoint drop rolls the row back.
                summary.errored.push(ImportErrorInfo {
                    row: row_no,
                    reason: format!("{:#}", err),
                });
            }
        }
    }

    tx.commit()?;
    Ok(summary)
}

enum Judgement {
    Fresh,
    Exact(String),
    Near(String),
    RoundAmount,
}

fn judge_duplicate(
    existing: &[ExistingTx],
    date: NaiveDate,
    amount: Decimal,
    memo: &str,
) -> Judgement {
    let mut near: Option<String> = None;
    for e in existing {
        if e.amount != amount {
            continue;
        }
        let days = (date - e.date).num_days().abs();
        if days == 0 && e.memo.trim().eq_ignore_ascii_case(memo.trim()) {
            return Judgement::Exact(e.memo.clone());
        }
        if days <= NEAR_DUPLICATE_DAYS
            && near.is_none()
            && text_similarity(memo, &e.memo) >= NEAR_DUPLICATE_SIMILARITY
        {
            near = Some(e.memo.clone());
        }
    }
    if let Some(collision) = near {
        return Judgement::Near(collision);
    }
    // Suspiciously round and large amounts get a human look.
    if amount.abs() >= Decimal::from(1000) && amount.fract().is_zero() {
        return Judgement::RoundAmount;
    }
    Judgement::Fresh
}

fn load_existing(conn: &rusqlite::Connection, account_id: i64) -> Result<Vec<ExistingTx>> {
    let mut stmt =
        conn.prepare("SELECT date, amount, memo FROM transactions WHERE account_id=?1")?;
    let rows = stmt.query_map(params![account_id], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (date, amount, memo) = row?;
        out.push(ExistingTx {
            date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("Invalid stored date '{}'", date))?,
            amount: amount
                .parse::<Decimal>()
                .with_context(|| format!("Invalid stored amount '{}'", amount))?,
            memo,
        });
    }
    Ok(out)
}

/// Locates date/amount/memo columns by header name, falling back to the
/// first three columns for headerless bank dialects.
fn resolve_columns(headers: &csv::StringRecord) -> (usize, usize, usize) {
    let mut date_idx = 0;
    let mut amount_idx = 1;
    let mut memo_idx = 2;
    for (i, h) in headers.iter().enumerate() {
        let h = h.trim().to_lowercase();
        if h.contains("buchungstag") || h.contains("datum") || h == "date" {
            date_idx = i;
        } else if h.contains("betrag") || h.contains("amount") {
            amount_idx = i;
        } else if h.contains("zweck") || h.contains("memo") || h.contains("usage") {
            memo_idx = i;
        }
    }
    (date_idx, amount_idx, memo_idx)
}

fn print_summary(summary: &ImportSummary) {
    println!(
        "Imported {}, skipped {} duplicates, {} suspicious, {} errored",
        summary.imported.len(),
        summary.skipped.len(),
        summary.suspicious.len(),
        summary.errored.len()
    );
    let buckets = [
        ("Imported", &summary.imported),
        ("Skipped", &summary.skipped),
        ("Suspicious", &summary.suspicious),
    ];
    for (label, rows) in buckets {
        if rows.is_empty() {
            continue;
        }
        let data: Vec<Vec<String>> = rows
            .iter()
            .map(|r| {
                vec![
                    r.date.clone(),
                    r.amount.clone(),
                    r.category.clone(),
                    r.memo.clone(),
                    r.collided_with.clone().unwrap_or_default(),
                ]
            })
            .collect();
        println!("{}:", label);
        println!(
            "{}",
            pretty_table(&["Date", "Amount", "Category", "Memo", "Collides with"], data)
        );
    }
    if !summary.errored.is_empty() {
        let data: Vec<Vec<String>> = summary
            .errored
            .iter()
            .map(|e| vec![e.row.to_string(), e.reason.clone()])
            .collect();
        println!("Errored rows:");
        println!("{}", pretty_table(&["Row", "Reason"], data));
    }
}
