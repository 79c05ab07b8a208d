// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Versioned snapshot codec for backup, restore, and sync.
//!
//! A snapshot is a full portable serialization of the entity graph. Its
//! content hash is deterministic over business data only: volatile fields
//! (timestamps, user/device identity, display metadata) never participate,
//! so "nothing changed" is detectable across devices and restarts.

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::models::TxKind;
use crate::utils::{fmt_amount, get_setting};

pub const SNAPSHOT_VERSION: &str = "2.0";

fn legacy_version() -> String {
    "1.0".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub name: String,
    #[serde(default)]
    pub group: Option<String>,
    pub kind: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_true")]
    pub include_in_balance: bool,
    #[serde(default)]
    pub transactions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub uuid: String,
    pub kind: TxKind,
    pub amount: Decimal,
    /// Epoch seconds at day granularity.
    pub date: i64,
    #[serde(default)]
    pub category: Option<String>,
    pub account: String,
    #[serde(default)]
    pub target_account: Option<String>,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub exclude_from_balance: bool,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub last_modified: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub name: String,
    #[serde(default)]
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "legacy_version")]
    pub version: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub account_groups: Vec<GroupRecord>,
    #[serde(default)]
    pub accounts: Vec<AccountRecord>,
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
    #[serde(default)]
    pub categories: Vec<CategoryRecord>,
}

/// Serializes the entire entity graph into a snapshot with its hash set.
pub fn encode(conn: &Connection) -> Result<Snapshot> {
    let user_id = get_setting(conn, "user_id")?.unwrap_or_default();
    let device_id = get_setting(conn, "device_id")?.unwrap_or_default();
    let device_name = get_setting(conn, "device_name")?.unwrap_or_default();

    let mut categories = Vec::new();
    let mut stmt = conn.prepare("SELECT name, sort_order FROM categories ORDER BY sort_order, name")?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
    for row in rows {
        let (name, sort_order) = row?;
        categories.push(CategoryRecord {
            name,
            sort_order: Some(sort_order),
        });
    }

    let mut account_groups = Vec::new();
    let mut stmt = conn.prepare(
        "SELECT id, name, icon, color, sort_order FROM account_groups ORDER BY sort_order, name",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, Option<String>>(2)?,
            r.get::<_, Option<String>>(3)?,
            r.get::<_, i64>(4)?,
        ))
    })?;
    for row in rows {
        let (id, name, icon, color, sort_order) = row?;
        let mut member_stmt =
            conn.prepare("SELECT name FROM accounts WHERE group_id=?1 ORDER BY sort_order, name")?;
        let members = member_stmt.query_map(params![id], |r| r.get::<_, String>(0))?;
        let mut accounts = Vec::new();
        for m in members {
            accounts.push(m?);
        }
        account_groups.push(GroupRecord {
            name,
            icon,
            color,
            sort_order: Some(sort_order),
            accounts,
        });
    }

    let mut accounts = Vec::new();
    let mut stmt = conn.prepare(
        "SELECT a.id, a.name, g.name, a.kind, a.icon, a.color, a.include_in_balance
         FROM accounts a LEFT JOIN account_groups g ON a.group_id=g.id
         ORDER BY a.sort_order, a.name",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, Option<String>>(2)?,
            r.get::<_, String>(3)?,
            r.get::<_, Option<String>>(4)?,
            r.get::<_, Option<String>>(5)?,
            r.get::<_, bool>(6)?,
        ))
    })?;
    for row in rows {
        let (id, name, group, kind, icon, color, include_in_balance) = row?;
        let mut member_stmt =
            conn.prepare("SELECT uuid FROM transactions WHERE account_id=?1 ORDER BY date, id")?;
        let members = member_stmt.query_map(params![id], |r| r.get::<_, String>(0))?;
        let mut transactions = Vec::new();
        for m in members {
            transactions.push(m?);
        }
        accounts.push(AccountRecord {
            name,
            group,
            kind,
            icon,
            color,
            include_in_balance,
            transactions,
        });
    }

    let mut transactions = Vec::new();
    let mut stmt = conn.prepare(
        "SELECT t.uuid, t.kind, t.amount, t.date, c.name, a.name, ta.name, t.memo,
                t.exclude_from_balance, t.user_id, t.last_modified
         FROM transactions t
         JOIN accounts a ON t.account_id=a.id
         LEFT JOIN accounts ta ON t.target_account_id=ta.id
         LEFT JOIN categories c ON t.category_id=c.id
         ORDER BY t.date, t.id",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
            r.get::<_, Option<String>>(4)?,
            r.get::<_, String>(5)?,
            r.get::<_, Option<String>>(6)?,
            r.get::<_, String>(7)?,
            r.get::<_, bool>(8)?,
            r.get::<_, String>(9)?,
            r.get::<_, i64>(10)?,
        ))
    })?;
    for row in rows {
        let (uuid, kind, amount, date, category, account, target, memo, excluded, user, modified) =
            row?;
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .with_context(|| format!("Invalid stored date '{}' on {}", date, uuid))?;
        transactions.push(TransactionRecord {
            uuid,
            kind: TxKind::parse(&kind)?,
            amount: amount
                .parse::<Decimal>()
                .with_context(|| format!("Invalid stored amount '{}'", amount))?,
            date: date_to_epoch(date),
            category,
            account,
            target_account: target,
            memo,
            exclude_from_balance: excluded,
            user_id: user,
            last_modified: modified,
        });
    }

    let mut snap = Snapshot {
        version: SNAPSHOT_VERSION.to_string(),
        created_at: Utc::now().timestamp(),
        user_id,
        device_id,
        device_name,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        content_hash: String::new(),
        account_groups,
        accounts,
        transactions,
        categories,
    };
    snap.content_hash = content_hash(&snap);
    Ok(snap)
}

/// Deterministic digest over business data.
///
/// Collections are sorted by a stable key before hashing, so insertion
/// order never changes the result. `created_at`, `last_modified`,
/// `user_id`/`device_id`, and display metadata are excluded.
pub fn content_hash(snap: &Snapshot) -> String {
    let mut canon = String::new();

    let mut cats: Vec<&str> = snap.categories.iter().map(|c| c.name.as_str()).collect();
    cats.sort_unstable();
    for name in cats {
        canon.push_str("category|");
        canon.push_str(name);
        canon.push('\n');
    }

    let mut groups: Vec<&GroupRecord> = snap.account_groups.iter().collect();
    groups.sort_unstable_by(|a, b| a.name.cmp(&b.name));
    for g in groups {
        canon.push_str("group|");
        canon.push_str(&g.name);
        canon.push('\n');
    }

    let mut accounts: Vec<&AccountRecord> = snap.accounts.iter().collect();
    accounts.sort_unstable_by(|a, b| a.name.cmp(&b.name));
    for a in accounts {
        canon.push_str(&format!(
            "account|{}|{}|{}|{}\n",
            a.name,
            a.group.as_deref().unwrap_or("-"),
            a.kind,
            a.include_in_balance,
        ));
    }

    let mut txs: Vec<&TransactionRecord> = snap.transactions.iter().collect();
    txs.sort_unstable_by(|a, b| a.uuid.cmp(&b.uuid));
    for t in txs {
        canon.push_str(&format!(
            "tx|{}|{}|{}|{}|{}|{}|{}|{}|{}\n",
            t.uuid,
            t.kind.as_str(),
            fmt_amount(&t.amount),
            t.date,
            t.category.as_deref().unwrap_or("-"),
            t.account,
            t.target_account.as_deref().unwrap_or("-"),
            t.memo,
            t.exclude_from_balance,
        ));
    }

    format!("{:x}", Sha256::digest(canon.as_bytes()))
}

pub fn to_bytes(snap: &Snapshot) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(snap)?)
}

pub fn from_bytes(bytes: &[u8]) -> Result<Snapshot> {
    serde_json::from_slice(bytes).context("Malformed snapshot JSON")
}

/// Referential-integrity check; must pass before restore deletes anything.
pub fn validate(snap: &Snapshot) -> Result<()> {
    let account_names: HashSet<&str> = snap.accounts.iter().map(|a| a.name.as_str()).collect();
    let mut seen_uuids = HashSet::new();
    for t in &snap.transactions {
        if !seen_uuids.insert(t.uuid.as_str()) {
            bail!("Snapshot contains duplicate transaction uuid '{}'", t.uuid);
        }
        if !account_names.contains(t.account.as_str()) {
            bail!(
                "Transaction {} references unknown account '{}'",
                t.uuid,
                t.account
            );
        }
        if let Some(target) = &t.target_account {
            if !account_names.contains(target.as_str()) {
                bail!(
                    "Transaction {} references unknown target account '{}'",
                    t.uuid,
                    target
                );
            }
            if target == &t.account {
                bail!(
                    "Transfer {} has identical source and target account '{}'",
                    t.uuid,
                    target
                );
            }
        }
    }
    Ok(())
}

/// Applies a snapshot as a full replacement of the local entity graph.
///
/// All four entity kinds are deleted and recreated in two passes
/// (name-keyed maps first, transactions second) inside one transaction;
/// a failure partway leaves the previous state untouched.
pub fn restore(conn: &mut Connection, snap: &Snapshot) -> Result<()> {
    validate(snap)?;

    let tx = conn.transaction()?;

    tx.execute("DELETE FROM transactions", [])?;
    tx.execute("DELETE FROM accounts", [])?;
    tx.execute("DELETE FROM account_groups", [])?;
    tx.execute("DELETE FROM categories", [])?;

    let mut category_ids: HashMap<String, i64> = HashMap::new();
    for (i, c) in snap.categories.iter().enumerate() {
        tx.execute(
            "INSERT INTO categories(name, sort_order) VALUES (?1, ?2)",
            params![c.name, c.sort_order.unwrap_or(i as i64)],
        )?;
        category_ids.insert(c.name.clone(), tx.last_insert_rowid());
    }

    let mut group_ids: HashMap<String, i64> = HashMap::new();
    for (i, g) in snap.account_groups.iter().enumerate() {
        tx.execute(
            "INSERT INTO account_groups(name, icon, color, sort_order) VALUES (?1, ?2, ?3, ?4)",
            params![g.name, g.icon, g.color, g.sort_order.unwrap_or(i as i64)],
        )?;
        group_ids.insert(g.name.clone(), tx.last_insert_rowid());
    }

    let mut account_ids: HashMap<String, i64> = HashMap::new();
    for (i, a) in snap.accounts.iter().enumerate() {
        // An unknown group name degrades to "ungrouped" rather than failing
        // the whole restore; legacy snapshots omit groups entirely.
        let group_id = a.group.as_ref().and_then(|g| group_ids.get(g)).copied();
        tx.execute(
            "INSERT INTO accounts(name, group_id, kind, icon, color, include_in_balance, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![a.name, group_id, a.kind, a.icon, a.color, a.include_in_balance, i as i64],
        )?;
        account_ids.insert(a.name.clone(), tx.last_insert_rowid());
    }

    for t in &snap.transactions {
        let account_id = account_ids
            .get(&t.account)
            .copied()
            .ok_or_else(|| anyhow!("Unresolved account '{}' for {}", t.account, t.uuid))?;
        let target_id = t
            .target_account
            .as_ref()
            .and_then(|n| account_ids.get(n))
            .copied();
        let category_id = t.category.as_ref().and_then(|n| category_ids.get(n)).copied();
        tx.execute(
            "INSERT INTO transactions(uuid, account_id, target_account_id, category_id, kind,
                                      amount, date, memo, exclude_from_balance, user_id, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                t.uuid,
                account_id,
                target_id,
                category_id,
                t.kind.as_str(),
                t.amount.to_string(),
                epoch_to_date(t.date).to_string(),
                t.memo,
                t.exclude_from_balance,
                t.user_id,
                t.last_modified
            ],
        )?;
    }

    tx.commit()?;
    Ok(())
}

pub fn date_to_epoch(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

pub fn epoch_to_date(secs: i64) -> NaiveDate {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}
