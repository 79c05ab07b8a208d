// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Result, anyhow};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Transaction kind. Income and expense carry a sign convention on the
/// amount (income positive, expense negative); transfers move money
/// between own accounts; neutral covers movements that are neither income
/// nor expense for reporting purposes (cash deposits, cautions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Income,
    Expense,
    Transfer,
    Neutral,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Income => "income",
            TxKind::Expense => "expense",
            TxKind::Transfer => "transfer",
            TxKind::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Result<TxKind> {
        match s {
            "income" => Ok(TxKind::Income),
            "expense" => Ok(TxKind::Expense),
            "transfer" => Ok(TxKind::Transfer),
            "neutral" => Ok(TxKind::Neutral),
            other => Err(anyhow!("Unknown transaction kind '{}'", other)),
        }
    }

    /// Kind implied by the sign of an amount (income or expense only).
    pub fn from_sign(amount: Decimal) -> TxKind {
        if amount >= Decimal::ZERO {
            TxKind::Income
        } else {
            TxKind::Expense
        }
    }
}

/// Amount sign and kind are redundantly encoded; every write path must
/// keep them consistent.
pub fn check_amount_kind(kind: TxKind, amount: Decimal) -> Result<()> {
    match kind {
        TxKind::Income if amount <= Decimal::ZERO => {
            Err(anyhow!("Income amount must be positive, got {}", amount))
        }
        TxKind::Expense if amount >= Decimal::ZERO => {
            Err(anyhow!("Expense amount must be negative, got {}", amount))
        }
        _ => Ok(()),
    }
}
