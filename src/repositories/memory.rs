use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::Mutex;

use super::LedgerStore;
use crate::error::LedgerError;
use crate::models::{
    accounts::Account,
    leaderboard::{self, LeaderboardEntry},
    transactions::{LedgerMutation, Transaction},
};

struct AccountLedger {
    account: Account,
    /// Insertion order, oldest first.
    transactions: Vec<Transaction>,
}

type SharedLedger = Arc<Mutex<AccountLedger>>;

/// Process-local store. Each account sits behind its own mutex, so mutations
/// of one account are serialized while other accounts proceed untouched.
#[derive(Clone, Default)]
pub struct MemoryLedgerRepository {
    ledgers: Arc<DashMap<String, SharedLedger>>,
}

impl MemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // Clones the handle out so no map shard guard is held across an await.
    fn ledger(&self, account_id: &str) -> Option<SharedLedger> {
        self.ledgers
            .get(account_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn all_ledgers(&self) -> Vec<SharedLedger> {
        self.ledgers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerRepository {
    async fn insert_account(
        &self,
        mut account: Account,
        opening: Option<LedgerMutation>,
    ) -> Result<Account, LedgerError> {
        let mut transactions = Vec::new();

        if let Some(mutation) = opening {
            let balance = account.apply(&mutation)?;
            account.commit(&mutation, balance);
            transactions.push(Transaction::record(&account.id, &mutation));
        }

        match self.ledgers.entry(account.id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::Storage(format!(
                "Duplicate account id: {}",
                account.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(AccountLedger {
                    account: account.clone(),
                    transactions,
                })));
                Ok(account)
            }
        }
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, LedgerError> {
        let Some(ledger) = self.ledger(account_id) else {
            return Ok(None);
        };
        let account = ledger.lock().await.account.clone();

        Ok(Some(account))
    }

    async fn apply_mutation(
        &self,
        account_id: &str,
        mutation: LedgerMutation,
    ) -> Result<(Account, Transaction), LedgerError> {
        let ledger = self
            .ledger(account_id)
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        let mut ledger = ledger.lock().await;
        let mutation = mutation.not_before(ledger.account.updated_at);
        let balance = ledger.account.apply(&mutation)?;

        // No await between here and the end: the unit cannot be cut in half.
        let transaction = Transaction::record(account_id, &mutation);
        ledger.account.commit(&mutation, balance);
        ledger.transactions.push(transaction.clone());
        debug_assert_eq!(
            ledger.account.balance,
            ledger.transactions.iter().map(Transaction::delta).sum::<i64>()
        );

        Ok((ledger.account.clone(), transaction))
    }

    async fn top_accounts(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        let mut entries = Vec::with_capacity(self.ledgers.len());
        for ledger in self.all_ledgers() {
            let ledger = ledger.lock().await;
            entries.push(LeaderboardEntry {
                account_id: ledger.account.id.clone(),
                display_name: ledger.account.display_name.clone(),
                balance: ledger.account.balance,
            });
        }

        leaderboard::rank(&mut entries);
        entries.truncate(limit as usize);

        Ok(entries)
    }

    async fn list_transactions(
        &self,
        account_id: &str,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let Some(ledger) = self.ledger(account_id) else {
            return Ok(Vec::new());
        };
        let ledger = ledger.lock().await;

        Ok(ledger
            .transactions
            .iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_transactions(&self, account_id: &str) -> Result<u64, LedgerError> {
        let Some(ledger) = self.ledger(account_id) else {
            return Ok(0);
        };
        let count = ledger.lock().await.transactions.len() as u64;

        Ok(count)
    }
}
