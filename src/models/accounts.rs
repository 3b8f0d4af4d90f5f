use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transactions::{LedgerMutation, Transaction, TransactionKind};
use crate::error::LedgerError;

pub const MAX_DISPLAY_NAME_LEN: usize = 64;

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub display_name: String,
    pub balance: i64,
    pub last_claim_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(display_name: String, at: DateTime<Utc>) -> Self {
        Account {
            id: Uuid::new_v4().hyphenated().to_string(),
            display_name,
            balance: 0,
            last_claim_date: None,
            created_at: at,
            updated_at: at,
        }
    }

    /// Checks `mutation` against the current state and returns the balance it
    /// would leave behind. Pure; the caller must hold the account lock.
    pub fn apply(&self, mutation: &LedgerMutation) -> Result<i64, LedgerError> {
        if mutation.amount <= 0 {
            return Err(LedgerError::InvalidInput(
                "Amount must be positive".to_string(),
            ));
        }

        // A claim stamped on or before the last claimed day lost the race to
        // the lock; it must not pay out again.
        if let Some(day) = mutation.claim_day {
            if self.last_claim_date.is_some_and(|last| last >= day) {
                return Err(LedgerError::AlreadyClaimedToday);
            }
        }

        match mutation.kind {
            TransactionKind::Earn => self.balance.checked_add(mutation.amount).ok_or_else(|| {
                LedgerError::InvalidInput("Amount would overflow balance".to_string())
            }),
            TransactionKind::Spend => {
                if mutation.amount > self.balance {
                    Err(LedgerError::InsufficientBalance {
                        balance: self.balance,
                        requested: mutation.amount,
                    })
                } else {
                    Ok(self.balance - mutation.amount)
                }
            }
        }
    }

    /// Writes an already-checked mutation into the account.
    pub fn commit(&mut self, mutation: &LedgerMutation, new_balance: i64) {
        self.balance = new_balance;
        if let Some(day) = mutation.claim_day {
            self.last_claim_date = self.last_claim_date.max(Some(day));
        }
        self.updated_at = self.updated_at.max(mutation.at);
    }
}

pub fn validate_display_name(display_name: Option<String>) -> Result<String, LedgerError> {
    let name = display_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| LedgerError::InvalidInput("Display name is required".to_string()))?;

    if name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(LedgerError::InvalidInput(format!(
            "Display name must be at most {} characters",
            MAX_DISPLAY_NAME_LEN
        )));
    }

    Ok(name)
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub account: Account,
    pub recent_transactions: Vec<Transaction>,
}
