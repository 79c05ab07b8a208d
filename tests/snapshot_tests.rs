// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use kassenbuch::db;
use kassenbuch::models::TxKind;
use kassenbuch::snapshot::{
    self, AccountRecord, CategoryRecord, GroupRecord, Snapshot, TransactionRecord,
};
use rusqlite::{Connection, params};
use rust_decimal::Decimal;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn account(name: &str) -> AccountRecord {
    AccountRecord {
        name: name.to_string(),
        group: None,
        kind: "bank".to_string(),
        icon: None,
        color: None,
        include_in_balance: true,
        transactions: Vec::new(),
    }
}

fn tx(uuid: &str, amount: &str, memo: &str, account: &str) -> TransactionRecord {
    TransactionRecord {
        uuid: uuid.to_string(),
        kind: if amount.starts_with('-') {
            TxKind::Expense
        } else {
            TxKind::Income
        },
        amount: dec(amount),
        date: 1_700_000_000,
        category: None,
        account: account.to_string(),
        target_account: None,
        memo: memo.to_string(),
        exclude_from_balance: false,
        user_id: "aabbccdd".to_string(),
        last_modified: 1_700_000_000,
    }
}

fn base_snapshot() -> Snapshot {
    Snapshot {
        version: snapshot::SNAPSHOT_VERSION.to_string(),
        created_at: 1_700_000_000,
        user_id: "aabbccdd".to_string(),
        device_id: "11223344".to_string(),
        device_name: "testbox".to_string(),
        app_version: "0.0.0".to_string(),
        content_hash: String::new(),
        account_groups: vec![GroupRecord {
            name: "Personal".to_string(),
            icon: None,
            color: None,
            sort_order: Some(0),
            accounts: vec!["Giro".to_string()],
        }],
        accounts: vec![account("Giro"), account("Cash")],
        transactions: vec![
            tx("uuid-a", "-50.00", "Kaution Wohnung", "Giro"),
            tx("uuid-b", "1200.00", "Gehalt", "Giro"),
        ],
        categories: vec![CategoryRecord {
            name: "Rent".to_string(),
            sort_order: Some(0),
        }],
    }
}

#[test]
fn hash_ignores_collection_order() {
    let a = base_snapshot();
    let mut b = base_snapshot();
    b.transactions.reverse();
    b.accounts.reverse();
    assert_eq!(snapshot::content_hash(&a), snapshot::content_hash(&b));
}

#[test]
fn hash_ignores_volatile_fields() {
    let a = base_snapshot();
    let mut b = base_snapshot();
    b.created_at = 1_800_000_000;
    b.user_id = "deadbeef".to_string();
    b.device_id = "f00dcafe".to_string();
    b.device_name = "otherbox".to_string();
    b.app_version = "9.9.9".to_string();
    b.transactions[0].last_modified = 1_800_000_000;
    b.transactions[0].user_id = "deadbeef".to_string();
    assert_eq!(snapshot::content_hash(&a), snapshot::content_hash(&b));
}

#[test]
fn hash_tracks_business_data() {
    let a = base_snapshot();

    // A one-cent amount change is a different snapshot.
    let mut b = base_snapshot();
    b.transactions[0].amount = dec("-49.99");
    assert_ne!(snapshot::content_hash(&a), snapshot::content_hash(&b));

    let mut c = base_snapshot();
    c.transactions[0].memo = "Kaution Keller".to_string();
    assert_ne!(snapshot::content_hash(&a), snapshot::content_hash(&c));

    let mut d = base_snapshot();
    d.accounts[1].include_in_balance = false;
    assert_ne!(snapshot::content_hash(&a), snapshot::content_hash(&d));
}

#[test]
fn bytes_round_trip_preserves_everything() {
    let mut snap = base_snapshot();
    snap.content_hash = snapshot::content_hash(&snap);
    let bytes = snapshot::to_bytes(&snap).unwrap();
    let back = snapshot::from_bytes(&bytes).unwrap();
    assert_eq!(back.version, snapshot::SNAPSHOT_VERSION);
    assert_eq!(back.content_hash, snap.content_hash);
    assert_eq!(snapshot::content_hash(&back), snap.content_hash);
    assert_eq!(back.transactions.len(), 2);
    assert_eq!(back.transactions[0].amount, dec("-50.00"));
}

#[test]
fn legacy_snapshot_without_version_still_decodes() {
    let json = br#"{
        "accounts": [{"name": "Giro", "kind": "bank"}],
        "transactions": [{
            "uuid": "legacy-1", "kind": "expense", "amount": "-10.00",
            "date": 1600000000, "account": "Giro"
        }]
    }"#;
    let snap = snapshot::from_bytes(json).unwrap();
    assert_eq!(snap.version, "1.0");
    assert!(snap.accounts[0].include_in_balance);
    assert_eq!(snap.transactions[0].memo, "");
    snapshot::validate(&snap).unwrap();
}

#[test]
fn validate_rejects_broken_references() {
    let mut dup = base_snapshot();
    dup.transactions.push(tx("uuid-a", "-1.00", "again", "Giro"));
    assert!(snapshot::validate(&dup).is_err());

    let mut orphan = base_snapshot();
    orphan.transactions.push(tx("uuid-c", "-1.00", "x", "Nonexistent"));
    assert!(snapshot::validate(&orphan).is_err());

    let mut selfie = base_snapshot();
    let mut t = tx("uuid-d", "-1.00", "loop", "Giro");
    t.kind = TxKind::Transfer;
    t.target_account = Some("Giro".to_string());
    selfie.transactions.push(t);
    assert!(snapshot::validate(&selfie).is_err());
}

fn seed(conn: &Connection) {
    conn.execute(
        "INSERT INTO account_groups(name, sort_order) VALUES ('Personal', 0)",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO accounts(name, group_id, kind) VALUES ('Giro', 1, 'bank')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO accounts(name, kind, include_in_balance) VALUES ('Depot', 'offline', 0)",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO categories(name, sort_order) VALUES ('Groceries', 0)",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO transactions(uuid, account_id, category_id, kind, amount, date, memo, last_modified)
         VALUES ('t-1', 1, 1, 'expense', '-23.40', '2025-03-01', 'REWE', 42)",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO transactions(uuid, account_id, target_account_id, kind, amount, date, memo)
         VALUES ('t-2', 1, 2, 'transfer', '-100.00', '2025-03-02', 'Umbuchung')",
        [],
    )
    .unwrap();
}

#[test]
fn encode_restore_round_trip_preserves_graph_and_hash() {
    let mut source = db::open_in_memory().unwrap();
    seed(&source);
    let snap = snapshot::encode(&source).unwrap();
    assert_eq!(snap.version, snapshot::SNAPSHOT_VERSION);
    assert_eq!(snap.content_hash, snapshot::content_hash(&snap));

    let mut target = db::open_in_memory().unwrap();
    // Pre-existing local data is replaced wholesale.
    target
        .execute("INSERT INTO categories(name) VALUES ('Stale')", [])
        .unwrap();
    snapshot::restore(&mut target, &snap).unwrap();

    let again = snapshot::encode(&target).unwrap();
    assert_eq!(again.content_hash, snap.content_hash);

    let stale: i64 = target
        .query_row("SELECT COUNT(*) FROM categories WHERE name='Stale'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(stale, 0);

    let (kind, target_name): (String, String) = target
        .query_row(
            "SELECT t.kind, ta.name FROM transactions t
             JOIN accounts ta ON t.target_account_id=ta.id WHERE t.uuid='t-2'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(kind, "transfer");
    assert_eq!(target_name, "Depot");

    // Restore is idempotent for the same snapshot.
    snapshot::restore(&mut source, &snap).unwrap();
    assert_eq!(snapshot::encode(&source).unwrap().content_hash, snap.content_hash);
}

#[test]
fn restore_leaves_state_untouched_on_invalid_snapshot() {
    let mut conn = db::open_in_memory().unwrap();
    seed(&conn);

    let mut bad = base_snapshot();
    bad.transactions.push(tx("uuid-x", "-1.00", "x", "Nowhere"));
    assert!(snapshot::restore(&mut conn, &bad).is_err());

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn restore_degrades_unknown_group_to_ungrouped() {
    let mut conn = db::open_in_memory().unwrap();
    let mut snap = base_snapshot();
    snap.accounts[0].group = Some("Vanished".to_string());
    snapshot::restore(&mut conn, &snap).unwrap();

    let group_id: Option<i64> = conn
        .query_row("SELECT group_id FROM accounts WHERE name='Giro'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(group_id, None);
}

#[test]
fn restore_keeps_learned_rules() {
    let mut conn = db::open_in_memory().unwrap();
    conn.execute(
        "INSERT INTO rules(pattern, category) VALUES ('rewe', 'Groceries')",
        params![],
    )
    .unwrap();
    snapshot::restore(&mut conn, &base_snapshot()).unwrap();
    let rules: i64 = conn
        .query_row("SELECT COUNT(*) FROM rules", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rules, 1);
}

#[test]
fn date_epoch_conversion_is_day_stable() {
    let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    let epoch = snapshot::date_to_epoch(date);
    assert_eq!(snapshot::epoch_to_date(epoch), date);
}
