// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use kassenbuch::db;
use kassenbuch::matcher::{self, Matcher};
use kassenbuch::models::TxKind;
use rust_decimal::Decimal;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

#[test]
fn cash_deposit_phrase_is_neutral_not_expense() {
    let conn = db::open_in_memory().unwrap();
    let m = Matcher::load(&conn).unwrap();
    let s = m.classify("SB-Einzahlung Geldautomat", dec("-120.00"));
    assert_eq!(s.category, "SB-Einzahlung");
    assert_eq!(s.kind, TxKind::Neutral);
}

#[test]
fn caution_matches_only_at_deposit_amount() {
    let conn = db::open_in_memory().unwrap();
    let m = Matcher::load(&conn).unwrap();

    let hit = m.classify("Kaution Wohnung", dec("-50.00"));
    assert_eq!(hit.category, "Kaution");
    assert_eq!(hit.kind, TxKind::Neutral);

    // Within a cent still counts.
    let close = m.classify("Kaution Wohnung", dec("-49.99"));
    assert_eq!(close.category, "Kaution");

    // Off the deposit amount it falls through to the buckets.
    let miss = m.classify("Kaution Wohnung", dec("-75.00"));
    assert_eq!(miss.category, "Small expenses");
    assert_eq!(miss.kind, TxKind::Expense);
}

#[test]
fn caution_from_business_counterpart_is_not_personal() {
    let conn = db::open_in_memory().unwrap();
    let m = Matcher::load(&conn).unwrap();
    let s = m.classify("Kaution Mietgeraet Bauhaus GmbH", dec("-50.00"));
    assert_ne!(s.category, "Kaution");
}

#[test]
fn amount_buckets_always_produce_a_category() {
    let conn = db::open_in_memory().unwrap();
    let m = Matcher::load(&conn).unwrap();
    assert_eq!(m.classify("Gehalt", dec("2500")).category, "Income");
    assert_eq!(
        m.classify("Moebelhaus", dec("-1500")).category,
        "Large expenses"
    );
    assert_eq!(
        m.classify("Wocheneinkauf", dec("-150")).category,
        "Medium expenses"
    );
    assert_eq!(m.classify("Kaffee", dec("-3.50")).category, "Small expenses");
    assert_eq!(m.classify("Kaffee", dec("-3.50")).kind, TxKind::Expense);
    assert_eq!(m.classify("Gehalt", dec("2500")).kind, TxKind::Income);
}

#[test]
fn first_substring_rule_in_insertion_order_wins() {
    let conn = db::open_in_memory().unwrap();
    let mut m = Matcher::load(&conn).unwrap();
    m.add_rule(&conn, "rewe", "Groceries").unwrap();
    m.add_rule(&conn, "rewe city", "Snacks").unwrap();

    let s = m.classify("REWE City Markt Koeln", dec("-23.40"));
    assert_eq!(s.category, "Groceries");
    assert_eq!(s.kind, TxKind::Expense);
}

#[test]
fn classify_is_pure_and_deterministic() {
    let conn = db::open_in_memory().unwrap();
    let mut m = Matcher::load(&conn).unwrap();
    m.add_rule(&conn, "netflix", "Entertainment").unwrap();

    let a = m.classify("NETFLIX.COM Abo", dec("-12.99"));
    let b = m.classify("NETFLIX.COM Abo", dec("-12.99"));
    assert_eq!(a, b);

    // No usage was recorded by classification alone.
    let count: i64 = conn
        .query_row("SELECT use_count FROM rules WHERE pattern='netflix'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn record_usage_bumps_and_persists_counter() {
    let conn = db::open_in_memory().unwrap();
    let mut m = Matcher::load(&conn).unwrap();
    let id = m.add_rule(&conn, "netflix", "Entertainment").unwrap();

    let s = m.classify("Netflix Abo", dec("-12.99"));
    assert_eq!(s.rule_id, Some(id));
    m.record_usage(&conn, id).unwrap();
    m.record_usage(&conn, id).unwrap();

    let count: i64 = conn
        .query_row("SELECT use_count FROM rules WHERE id=?1", [id], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn fuzzy_match_tolerates_small_variations() {
    let conn = db::open_in_memory().unwrap();
    let mut m = Matcher::load(&conn).unwrap();
    m.add_rule(&conn, "stadtwerke koeln", "Utilities").unwrap();

    // One typo over a 16-char pattern stays above the 0.8 threshold.
    let s = m.classify("stadtwerke kqeln", dec("-89.00"));
    assert_eq!(s.category, "Utilities");

    // A totally different memo falls through to the buckets.
    let other = m.classify("Zahnarzt Rechnung", dec("-89.00"));
    assert_eq!(other.category, "Small expenses");
}

#[test]
fn learn_inserts_and_updates_short_form_rules() {
    let conn = db::open_in_memory().unwrap();
    let mut m = Matcher::load(&conn).unwrap();
    m.learn(&conn, "AMAZON EU S.A R.L. 882-23", "amazon", "Shopping")
        .unwrap();

    let s = m.classify("Bestellung amazon marketplace", dec("-31.00"));
    assert_eq!(s.category, "Shopping");

    // The long original text matches too.
    let long = m.classify("AMAZON EU S.A R.L. 882-23 order", dec("-10.00"));
    assert_eq!(long.category, "Shopping");

    // Re-teaching the same short form updates instead of duplicating.
    m.learn(&conn, "AMAZON EU S.A R.L. 882-23", "amazon", "Online shopping")
        .unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM rules", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 1);
    let again = m.classify("Bestellung amazon marketplace", dec("-31.00"));
    assert_eq!(again.category, "Online shopping");
}

#[test]
fn deposit_categories_map_to_neutral_kind() {
    assert_eq!(
        matcher::kind_for_category("SB-Einzahlung", dec("-120.00")),
        TxKind::Neutral
    );
    assert_eq!(
        matcher::kind_for_category("Kaution", dec("-50.00")),
        TxKind::Neutral
    );
    assert_eq!(
        matcher::kind_for_category("Groceries", dec("-20.00")),
        TxKind::Expense
    );
    assert_eq!(
        matcher::kind_for_category("Salary", dec("2000.00")),
        TxKind::Income
    );
}
