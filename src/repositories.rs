use async_trait::async_trait;

use crate::error::LedgerError;
use crate::models::{
    accounts::Account,
    leaderboard::LeaderboardEntry,
    transactions::{LedgerMutation, Transaction},
};

pub mod ledger;
pub mod memory;

/// Persistent account and transaction storage.
///
/// Implementations own the atomicity of the ledger: `apply_mutation` must run
/// the rule check, the balance update and the transaction insert as one unit,
/// serialized against other mutations of the same account and independent of
/// every other account.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Inserts `account`, applying `opening` (if any) in the same unit.
    async fn insert_account(
        &self,
        account: Account,
        opening: Option<LedgerMutation>,
    ) -> Result<Account, LedgerError>;

    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, LedgerError>;

    async fn apply_mutation(
        &self,
        account_id: &str,
        mutation: LedgerMutation,
    ) -> Result<(Account, Transaction), LedgerError>;

    /// Top accounts by balance descending, ties by account id ascending.
    async fn top_accounts(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, LedgerError>;

    /// Newest first.
    async fn list_transactions(
        &self,
        account_id: &str,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Transaction>, LedgerError>;

    async fn count_transactions(&self, account_id: &str) -> Result<u64, LedgerError>;
}
