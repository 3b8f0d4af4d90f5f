use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DAILY_BONUS_DESCRIPTION: &str = "Daily login bonus";
pub const WELCOME_BONUS_DESCRIPTION: &str = "Welcome bonus";
pub const BONUS_CATEGORY: &str = "bonus";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Earn,
    Spend,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Earn => "earn",
            TransactionKind::Spend => "spend",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown transaction kind: {0}")]
pub struct UnknownKind(pub String);

impl TryFrom<String> for TransactionKind {
    type Error = UnknownKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "earn" => Ok(TransactionKind::Earn),
            "spend" => Ok(TransactionKind::Spend),
            _ => Err(UnknownKind(value)),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    #[sqlx(try_from = "String")]
    pub kind: TransactionKind,
    pub amount: i64,
    pub description: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds the ledger row for a mutation that has already passed `Account::apply`.
    pub fn record(account_id: &str, mutation: &LedgerMutation) -> Self {
        Transaction {
            id: Uuid::new_v4().hyphenated().to_string(),
            account_id: account_id.to_string(),
            kind: mutation.kind,
            amount: mutation.amount,
            description: mutation.description.clone(),
            category: mutation.category.clone(),
            created_at: mutation.at,
        }
    }

    /// Signed effect on the balance.
    pub fn delta(&self) -> i64 {
        match self.kind {
            TransactionKind::Earn => self.amount,
            TransactionKind::Spend => -self.amount,
        }
    }
}

/// A single balance-affecting event, applied to an account as one atomic unit
/// together with the transaction row it produces.
#[derive(Clone, Debug)]
pub struct LedgerMutation {
    pub kind: TransactionKind,
    pub amount: i64,
    pub description: String,
    pub category: String,
    pub at: DateTime<Utc>,
    /// Set for daily claims: the UTC day being claimed.
    pub claim_day: Option<NaiveDate>,
}

impl LedgerMutation {
    pub fn new(
        kind: TransactionKind,
        amount: i64,
        description: String,
        category: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let category = category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| kind.as_str().to_string());

        LedgerMutation {
            kind,
            amount,
            description,
            category,
            at,
            claim_day: None,
        }
    }

    pub fn daily_bonus(amount: i64, at: DateTime<Utc>) -> Self {
        LedgerMutation {
            kind: TransactionKind::Earn,
            amount,
            description: DAILY_BONUS_DESCRIPTION.to_string(),
            category: BONUS_CATEGORY.to_string(),
            at,
            claim_day: Some(at.date_naive()),
        }
    }

    /// Moves the timestamp up to `floor` if it lags behind. Stores call this
    /// with the account's last update once the account lock is held, so
    /// `created_at` never runs backwards against insertion order.
    pub fn not_before(mut self, floor: DateTime<Utc>) -> Self {
        self.at = self.at.max(floor);
        self
    }

    pub fn welcome_bonus(amount: i64, at: DateTime<Utc>) -> Self {
        LedgerMutation {
            kind: TransactionKind::Earn,
            amount,
            description: WELCOME_BONUS_DESCRIPTION.to_string(),
            category: BONUS_CATEGORY.to_string(),
            at,
            claim_day: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TransactionRequest {
    pub amount: Option<i64>,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RecordTransactionRequest {
    pub kind: Option<String>,
    pub amount: Option<i64>,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationReceipt {
    pub new_balance: i64,
    pub transaction: Transaction,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimReceipt {
    pub new_balance: i64,
    pub bonus_amount: i64,
    pub transaction: Transaction,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub items: Vec<Transaction>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl TransactionPage {
    pub fn total_pages(total: u64, page_size: u32) -> u64 {
        total.div_ceil(page_size as u64)
    }
}
