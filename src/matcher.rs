// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Heuristic category suggestion for free-text transaction memos.
//!
//! Classification is pure and deterministic for a fixed rule set; usage
//! counting and rule learning are explicit, separate persistence effects.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;

use crate::models::TxKind;
use crate::utils::text_similarity;

/// Category assigned to recognized self-service cash deposits.
pub const CATEGORY_CASH_DEPOSIT: &str = "SB-Einzahlung";
/// Category assigned to recognized security deposits.
pub const CATEGORY_CAUTION: &str = "Kaution";

/// Amount bucket fallbacks; classification can never come back empty.
pub const CATEGORY_INCOME: &str = "Income";
pub const CATEGORY_LARGE_EXPENSES: &str = "Large expenses";
pub const CATEGORY_MEDIUM_EXPENSES: &str = "Medium expenses";
pub const CATEGORY_SMALL_EXPENSES: &str = "Small expenses";

const CASH_DEPOSIT_PHRASES: &[&str] = &[
    "sb-einzahlung",
    "sb einzahlung",
    "selbstbedienung einzahlung",
    "einzahlung geldautomat",
    "einzahlung sb",
];

const CAUTION_PHRASES: &[&str] = &["kaution", "caution", "mietkaution"];

/// Legal-entity suffixes; a memo naming a registered business is not a
/// personal caution even at the caution amount.
const BUSINESS_TOKENS: &[&str] = &[
    "gmbh", "ag", "kg", "ohg", "ug", "ev", "ek", "ltd", "inc", "llc",
];

/// Security deposits are recognized at exactly 50.00 (within a cent).
const CAUTION_AMOUNT: Decimal = Decimal::from_parts(5000, 0, 0, false, 2);
const CAUTION_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

const FUZZY_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct Rule {
    pub id: i64,
    pub pattern: String,
    pub original_text: Option<String>,
    pub short_form: Option<String>,
    pub category: String,
    pub use_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub category: String,
    pub kind: TxKind,
    /// Rule that produced the match, if any; pass to [`Matcher::record_usage`].
    pub rule_id: Option<i64>,
}

#[derive(Debug)]
pub struct Matcher {
    rules: Vec<Rule>,
}

impl Matcher {
    /// Loads the persisted rule set in insertion order.
    pub fn load(conn: &Connection) -> Result<Matcher> {
        let mut stmt = conn.prepare(
            "SELECT id, pattern, original_text, short_form, category, use_count
             FROM rules ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(Rule {
                id: r.get(0)?,
                pattern: r.get(1)?,
                original_text: r.get(2)?,
                short_form: r.get(3)?,
                category: r.get(4)?,
                use_count: r.get(5)?,
            })
        })?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?);
        }
        Ok(Matcher { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Suggests a `(category, kind)` for a memo and signed amount.
    ///
    /// Pure: does not touch the rule store. The amount-bucket fallback
    /// guarantees a category is always returned.
    pub fn classify(&self, memo: &str, amount: Decimal) -> Suggestion {
        let haystack = memo.trim().to_lowercase();

        if CASH_DEPOSIT_PHRASES.iter().any(|p| haystack.contains(p)) {
            return Suggestion {
                category: CATEGORY_CASH_DEPOSIT.to_string(),
                kind: TxKind::Neutral,
                rule_id: None,
            };
        }

        if CAUTION_PHRASES.iter().any(|p| haystack.contains(p))
            && (amount.abs() - CAUTION_AMOUNT).abs() <= CAUTION_TOLERANCE
            && !looks_like_business(&haystack)
        {
            return Suggestion {
                category: CATEGORY_CAUTION.to_string(),
                kind: TxKind::Neutral,
                rule_id: None,
            };
        }

        // First substring hit wins, in insertion order.
        for rule in &self.rules {
            if rule_matches_substring(rule, &haystack) {
                return Suggestion {
                    kind: kind_for_category(&rule.category, amount),
                    category: rule.category.clone(),
                    rule_id: Some(rule.id),
                };
            }
        }

        // Fuzzy pass over the rule patterns.
        let mut best: Option<(f64, &Rule)> = None;
        for rule in &self.rules {
            let score = text_similarity(&haystack, &rule.pattern);
            if score > FUZZY_THRESHOLD && best.map_or(true, |(b, _)| score > b) {
                best = Some((score, rule));
            }
        }
        if let Some((_, rule)) = best {
            return Suggestion {
                kind: kind_for_category(&rule.category, amount),
                category: rule.category.clone(),
                rule_id: Some(rule.id),
            };
        }

        let category = if amount > Decimal::ZERO {
            CATEGORY_INCOME
        } else if amount <= Decimal::from(-1000) {
            CATEGORY_LARGE_EXPENSES
        } else if amount <= Decimal::from(-100) {
            CATEGORY_MEDIUM_EXPENSES
        } else {
            CATEGORY_SMALL_EXPENSES
        };
        Suggestion {
            category: category.to_string(),
            kind: kind_for_category(category, amount),
            rule_id: None,
        }
    }

    /// Bumps the usage counter of a rule and persists it.
    pub fn record_usage(&mut self, conn: &Connection, rule_id: i64) -> Result<()> {
        conn.execute(
            "UPDATE rules SET use_count = use_count + 1 WHERE id=?1",
            params![rule_id],
        )
        .with_context(|| format!("Record usage for rule {}", rule_id))?;
        if let Some(rule) = self.rules.iter_mut().find(|r| r.id == rule_id) {
            rule.use_count += 1;
        }
        Ok(())
    }

    /// Inserts a plain `(pattern, category)` rule.
    pub fn add_rule(&mut self, conn: &Connection, pattern: &str, category: &str) -> Result<i64> {
        conn.execute(
            "INSERT INTO rules(pattern, category) VALUES (?1, ?2)",
            params![pattern.trim(), category.trim()],
        )?;
        let id = conn.last_insert_rowid();
        self.rules.push(Rule {
            id,
            pattern: pattern.trim().to_string(),
            original_text: None,
            short_form: None,
            category: category.trim().to_string(),
            use_count: 0,
        });
        Ok(id)
    }

    /// Teaches the matcher that a long counterpart string abbreviates to a
    /// known payee. Updates an existing rule for the short form or inserts
    /// a new one.
    pub fn learn(
        &mut self,
        conn: &Connection,
        original_text: &str,
        short_form: &str,
        category: &str,
    ) -> Result<()> {
        let short = short_form.trim();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM rules WHERE pattern=?1 OR short_form=?1",
                params![short],
                |r| r.get(0),
            )
            .optional()?;
        match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE rules SET original_text=?1, short_form=?2, category=?3 WHERE id=?4",
                    params![original_text.trim(), short, category.trim(), id],
                )?;
                if let Some(rule) = self.rules.iter_mut().find(|r| r.id == id) {
                    rule.original_text = Some(original_text.trim().to_string());
                    rule.short_form = Some(short.to_string());
                    rule.category = category.trim().to_string();
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO rules(pattern, original_text, short_form, category)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![short, original_text.trim(), short, category.trim()],
                )?;
                self.rules.push(Rule {
                    id: conn.last_insert_rowid(),
                    pattern: short.to_string(),
                    original_text: Some(original_text.trim().to_string()),
                    short_form: Some(short.to_string()),
                    category: category.trim().to_string(),
                    use_count: 0,
                });
            }
        }
        Ok(())
    }
}

fn rule_matches_substring(rule: &Rule, haystack: &str) -> bool {
    let candidates = [
        Some(rule.pattern.as_str()),
        rule.original_text.as_deref(),
        rule.short_form.as_deref(),
    ];
    candidates.into_iter().flatten().any(|c| {
        let c = c.trim().to_lowercase();
        !c.is_empty() && haystack.contains(&c)
    })
}

/// Deposit-like categories are neutral; everything else follows the sign.
pub fn kind_for_category(category: &str, amount: Decimal) -> TxKind {
    if category == CATEGORY_CASH_DEPOSIT || category == CATEGORY_CAUTION {
        TxKind::Neutral
    } else {
        TxKind::from_sign(amount)
    }
}

fn looks_like_business(haystack: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .any(|token| BUSINESS_TOKENS.contains(&token))
}
