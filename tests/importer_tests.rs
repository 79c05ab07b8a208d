// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use kassenbuch::commands::importer::import_csv;
use kassenbuch::db;
use rusqlite::Connection;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_csv(content: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(content.as_bytes()).unwrap();
    f.flush().unwrap();
    f
}

fn conn_with_account() -> Connection {
    let conn = db::open_in_memory().unwrap();
    conn.execute("INSERT INTO accounts(name, kind) VALUES ('Giro', 'bank')", [])
        .unwrap();
    conn
}

fn tx_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))
        .unwrap()
}

#[test]
fn imports_german_bank_export() {
    let mut conn = conn_with_account();
    let csv = write_csv(
        "Buchungstag,Betrag,Verwendungszweck\n\
         01.03.2025,\"-23,40\",REWE SAGT DANKE\n\
         02.03.2025,\"1.234,56\",Gehalt Maerz\n",
    );
    let summary = import_csv(&mut conn, "Giro", csv.path().to_str().unwrap(), false).unwrap();
    assert_eq!(summary.imported.len(), 2);
    assert!(summary.skipped.is_empty());
    assert!(summary.suspicious.is_empty());
    assert!(summary.errored.is_empty());
    assert_eq!(tx_count(&conn), 2);

    // Thousands separator and decimal comma were normalized.
    let amount: String = conn
        .query_row(
            "SELECT amount FROM transactions WHERE memo='Gehalt Maerz'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(amount, "1234.56");

    // Categorization created the bucket categories on the fly.
    let cat: String = conn
        .query_row(
            "SELECT c.name FROM transactions t JOIN categories c ON t.category_id=c.id
             WHERE t.memo='REWE SAGT DANKE'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(cat, "Small expenses");
}

#[test]
fn second_import_of_same_file_is_a_no_op() {
    let mut conn = conn_with_account();
    let csv = write_csv(
        "date,amount,memo\n\
         2025-03-01,-23.40,REWE SAGT DANKE\n\
         2025-03-02,-9.99,Netflix\n",
    );
    let path = csv.path().to_str().unwrap().to_string();

    let first = import_csv(&mut conn, "Giro", &path, false).unwrap();
    assert_eq!(first.imported.len(), 2);

    let second = import_csv(&mut conn, "Giro", &path, false).unwrap();
    assert!(second.imported.is_empty());
    assert_eq!(second.skipped.len(), 2);
    assert_eq!(second.skipped[0].collided_with.as_deref(), Some("REWE SAGT DANKE"));
    assert_eq!(tx_count(&conn), 2);
}

#[test]
fn duplicates_within_one_file_are_caught() {
    let mut conn = conn_with_account();
    let csv = write_csv(
        "date,amount,memo\n\
         2025-03-01,-23.40,REWE SAGT DANKE\n\
         2025-03-01,-23.40,REWE SAGT DANKE\n",
    );
    let summary = import_csv(&mut conn, "Giro", csv.path().to_str().unwrap(), false).unwrap();
    assert_eq!(summary.imported.len(), 1);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(tx_count(&conn), 1);
}

#[test]
fn near_duplicate_is_held_unless_accepted() {
    let mut conn = conn_with_account();
    conn.execute(
        "INSERT INTO transactions(uuid, account_id, kind, amount, date, memo)
         VALUES ('seed-1', 1, 'expense', '-23.40', '2025-03-01', 'REWE SAGT DANKE 123')",
        [],
    )
    .unwrap();

    let csv = write_csv("date,amount,memo\n2025-03-03,-23.40,REWE SAGT DANKE 124\n");
    let path = csv.path().to_str().unwrap().to_string();

    let held = import_csv(&mut conn, "Giro", &path, false).unwrap();
    assert!(held.imported.is_empty());
    assert_eq!(held.suspicious.len(), 1);
    assert!(held.suspicious[0].suspicious);
    assert_eq!(
        held.suspicious[0].collided_with.as_deref(),
        Some("REWE SAGT DANKE 123")
    );
    assert_eq!(tx_count(&conn), 1);

    let accepted = import_csv(&mut conn, "Giro", &path, true).unwrap();
    assert_eq!(accepted.imported.len(), 1);
    assert_eq!(tx_count(&conn), 2);
}

#[test]
fn large_round_amounts_are_held_for_review() {
    let mut conn = conn_with_account();
    let csv = write_csv(
        "date,amount,memo\n\
         2025-03-01,-1000.00,Handwerker\n\
         2025-03-02,-999.99,Handwerker Rest\n",
    );
    let summary = import_csv(&mut conn, "Giro", csv.path().to_str().unwrap(), false).unwrap();
    assert_eq!(summary.suspicious.len(), 1);
    assert_eq!(summary.suspicious[0].memo, "Handwerker");
    assert!(summary.suspicious[0].collided_with.is_none());
    assert_eq!(summary.imported.len(), 1);
}

#[test]
fn malformed_rows_are_reported_not_dropped() {
    let mut conn = conn_with_account();
    let csv = write_csv(
        "date,amount,memo\n\
         2025-03-01,-23.40,ok row\n\
         not-a-date,-1.00,bad date\n\
         2025-03-03,not-an-amount,bad amount\n\
         2025-03-04,-5.00,another ok row\n",
    );
    let summary = import_csv(&mut conn, "Giro", csv.path().to_str().unwrap(), false).unwrap();
    assert_eq!(summary.imported.len(), 2);
    assert_eq!(summary.errored.len(), 2);
    // Row numbers are 1-based counting the header.
    assert_eq!(summary.errored[0].row, 3);
    assert_eq!(summary.errored[1].row, 4);
    assert_eq!(tx_count(&conn), 2);
}

#[test]
fn unknown_headers_fall_back_to_first_three_columns() {
    let mut conn = conn_with_account();
    let csv = write_csv("a,b,c\n2025-03-01,-12.00,Kiosk\n");
    let summary = import_csv(&mut conn, "Giro", csv.path().to_str().unwrap(), false).unwrap();
    assert_eq!(summary.imported.len(), 1);
    assert_eq!(summary.imported[0].memo, "Kiosk");
}

#[test]
fn import_against_missing_account_fails_cleanly() {
    let mut conn = db::open_in_memory().unwrap();
    let csv = write_csv("date,amount,memo\n2025-03-01,-1.00,x\n");
    let err = import_csv(&mut conn, "Nope", csv.path().to_str().unwrap(), false);
    assert!(err.is_err());
    assert_eq!(tx_count(&conn), 0);
}

#[test]
fn learned_rules_categorize_and_count_usage() {
    let mut conn = conn_with_account();
    conn.execute(
        "INSERT INTO rules(pattern, category) VALUES ('netflix', 'Entertainment')",
        [],
    )
    .unwrap();
    let csv = write_csv("date,amount,memo\n2025-03-01,-12.99,NETFLIX.COM Abo\n");
    let summary = import_csv(&mut conn, "Giro", csv.path().to_str().unwrap(), false).unwrap();
    assert_eq!(summary.imported[0].category, "Entertainment");

    let uses: i64 = conn
        .query_row("SELECT use_count FROM rules WHERE pattern='netflix'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(uses, 1);
}
