use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{RequestHandler, Service};
use crate::error::LedgerError;
use crate::models::transactions::{
    ClaimReceipt, HistoryQuery, LedgerMutation, MutationReceipt, RecordTransactionRequest,
    TransactionKind, TransactionPage, TransactionRequest,
};
use crate::repositories::LedgerStore;
use crate::settings::Settings;
use crate::utils::{with_timeout, Clock};

pub enum LedgerRequest {
    Claim {
        account_id: String,
        response: oneshot::Sender<Result<ClaimReceipt, LedgerError>>,
    },
    Earn {
        account_id: String,
        request: TransactionRequest,
        response: oneshot::Sender<Result<MutationReceipt, LedgerError>>,
    },
    Spend {
        account_id: String,
        request: TransactionRequest,
        response: oneshot::Sender<Result<MutationReceipt, LedgerError>>,
    },
    Record {
        account_id: String,
        request: RecordTransactionRequest,
        response: oneshot::Sender<Result<MutationReceipt, LedgerError>>,
    },
    History {
        account_id: String,
        query: HistoryQuery,
        response: oneshot::Sender<Result<TransactionPage, LedgerError>>,
    },
}

#[derive(Clone)]
pub struct LedgerRequestHandler {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    daily_bonus: i64,
    default_page_size: u32,
    max_page_size: u32,
    timeout: Duration,
}

impl LedgerRequestHandler {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, settings: &Settings) -> Self {
        LedgerRequestHandler {
            store,
            clock,
            daily_bonus: settings.rewards.daily_bonus,
            default_page_size: settings.history.default_page_size,
            max_page_size: settings.history.max_page_size,
            timeout: settings.storage.timeout(),
        }
    }

    pub async fn claim(&self, account_id: &str) -> Result<ClaimReceipt, LedgerError> {
        let mutation = LedgerMutation::daily_bonus(self.daily_bonus, self.clock.now());

        let result = with_timeout(
            self.timeout,
            self.store.apply_mutation(account_id, mutation),
        )
        .await;

        match result {
            Ok((account, transaction)) => {
                log::info!(
                    "Account {} claimed daily bonus of {}, balance now {}.",
                    account_id,
                    self.daily_bonus,
                    account.balance
                );
                Ok(ClaimReceipt {
                    new_balance: account.balance,
                    bonus_amount: self.daily_bonus,
                    transaction,
                })
            }
            Err(e) if e.is_fault() => {
                log::error!("Daily claim failed for account {}: {}", account_id, e);
                Err(e)
            }
            Err(e) => {
                log::info!("Daily claim rejected for account {}: {}", account_id, e);
                Err(e)
            }
        }
    }

    pub async fn earn(
        &self,
        account_id: &str,
        request: TransactionRequest,
    ) -> Result<MutationReceipt, LedgerError> {
        self.mutate(
            account_id,
            TransactionKind::Earn,
            request.amount,
            request.description,
            request.category,
        )
        .await
    }

    pub async fn spend(
        &self,
        account_id: &str,
        request: TransactionRequest,
    ) -> Result<MutationReceipt, LedgerError> {
        self.mutate(
            account_id,
            TransactionKind::Spend,
            request.amount,
            request.description,
            request.category,
        )
        .await
    }

    pub async fn record(
        &self,
        account_id: &str,
        request: RecordTransactionRequest,
    ) -> Result<MutationReceipt, LedgerError> {
        let kind = request
            .kind
            .ok_or_else(|| LedgerError::InvalidInput("Kind is required".to_string()))
            .and_then(|kind| {
                TransactionKind::try_from(kind).map_err(|e| LedgerError::InvalidInput(e.to_string()))
            })?;

        self.mutate(
            account_id,
            kind,
            request.amount,
            request.description,
            request.category,
        )
        .await
    }

    async fn mutate(
        &self,
        account_id: &str,
        kind: TransactionKind,
        amount: Option<i64>,
        description: Option<String>,
        category: Option<String>,
    ) -> Result<MutationReceipt, LedgerError> {
        let amount =
            amount.ok_or_else(|| LedgerError::InvalidInput("Amount is required".to_string()))?;
        if amount <= 0 {
            return Err(LedgerError::InvalidInput(
                "Amount must be positive".to_string(),
            ));
        }
        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| LedgerError::InvalidInput("Description is required".to_string()))?;

        let mutation = LedgerMutation::new(kind, amount, description, category, self.clock.now());
        let (account, transaction) = with_timeout(
            self.timeout,
            self.store.apply_mutation(account_id, mutation),
        )
        .await
        .inspect_err(|e| {
            if e.is_fault() {
                log::error!(
                    "{} of {} failed for account {}: {}",
                    kind.as_str(),
                    amount,
                    account_id,
                    e
                )
            } else {
                log::warn!(
                    "{} of {} rejected for account {}: {}",
                    kind.as_str(),
                    amount,
                    account_id,
                    e
                )
            }
        })?;

        log::info!(
            "Account {} {} {} coins, balance now {}.",
            account_id,
            kind.as_str(),
            amount,
            account.balance
        );

        Ok(MutationReceipt {
            new_balance: account.balance,
            transaction,
        })
    }

    pub async fn history(
        &self,
        account_id: &str,
        query: HistoryQuery,
    ) -> Result<TransactionPage, LedgerError> {
        let page = query.page.unwrap_or(1);
        if page == 0 {
            return Err(LedgerError::InvalidInput(
                "Page must be at least 1".to_string(),
            ));
        }

        let page_size = query.page_size.unwrap_or(self.default_page_size);
        if page_size == 0 || page_size > self.max_page_size {
            return Err(LedgerError::InvalidInput(format!(
                "Page size must be between 1 and {}",
                self.max_page_size
            )));
        }

        with_timeout(self.timeout, self.store.get_account(account_id))
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        let total = with_timeout(self.timeout, self.store.count_transactions(account_id)).await?;
        let offset = (page as u64 - 1) * page_size as u64;
        let items = with_timeout(
            self.timeout,
            self.store.list_transactions(account_id, offset, page_size),
        )
        .await?;

        Ok(TransactionPage {
            items,
            page,
            page_size,
            total,
            total_pages: TransactionPage::total_pages(total, page_size),
        })
    }
}

#[async_trait]
impl RequestHandler<LedgerRequest> for LedgerRequestHandler {
    async fn handle_request(&self, request: LedgerRequest) {
        match request {
            LedgerRequest::Claim {
                account_id,
                response,
            } => {
                let result = self.claim(&account_id).await;
                let _ = response.send(result);
            }
            LedgerRequest::Earn {
                account_id,
                request,
                response,
            } => {
                let result = self.earn(&account_id, request).await;
                let _ = response.send(result);
            }
            LedgerRequest::Spend {
                account_id,
                request,
                response,
            } => {
                let result = self.spend(&account_id, request).await;
                let _ = response.send(result);
            }
            LedgerRequest::Record {
                account_id,
                request,
                response,
            } => {
                let result = self.record(&account_id, request).await;
                let _ = response.send(result);
            }
            LedgerRequest::History {
                account_id,
                query,
                response,
            } => {
                let result = self.history(&account_id, query).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct LedgerService;

impl LedgerService {
    pub fn new() -> Self {
        LedgerService {}
    }
}

#[async_trait]
impl Service<LedgerRequest, LedgerRequestHandler> for LedgerService {}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use futures_util::future::join_all;

    use super::*;
    use crate::models::accounts::Account;
    use crate::models::transactions::{
        Transaction, BONUS_CATEGORY, DAILY_BONUS_DESCRIPTION,
    };
    use crate::repositories::memory::MemoryLedgerRepository;
    use crate::utils::testing::FixedClock;

    struct Fixture {
        store: Arc<MemoryLedgerRepository>,
        clock: Arc<FixedClock>,
        handler: LedgerRequestHandler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryLedgerRepository::new());
        let clock = Arc::new(FixedClock::at(2025, 3, 10, 12));
        let handler = LedgerRequestHandler::new(store.clone(), clock.clone(), &Settings::default());
        Fixture {
            store,
            clock,
            handler,
        }
    }

    impl Fixture {
        async fn account_with(&self, coins: i64) -> Account {
            let now = self.clock.now();
            let opening = (coins > 0).then(|| LedgerMutation::welcome_bonus(coins, now));
            self.store
                .insert_account(Account::new("tester".to_string(), now), opening)
                .await
                .unwrap()
        }

        async fn all_transactions(&self, account_id: &str) -> Vec<Transaction> {
            self.store
                .list_transactions(account_id, 0, u32::MAX)
                .await
                .unwrap()
        }

        async fn assert_ledger_consistent(&self, account_id: &str) {
            let account = self.store.get_account(account_id).await.unwrap().unwrap();
            let sum: i64 = self
                .all_transactions(account_id)
                .await
                .iter()
                .map(Transaction::delta)
                .sum();
            assert_eq!(account.balance, sum);
        }
    }

    fn request(amount: i64, description: &str) -> TransactionRequest {
        TransactionRequest {
            amount: Some(amount),
            description: Some(description.to_string()),
            category: None,
        }
    }

    #[tokio::test]
    async fn claim_awards_bonus_and_records_it_last() {
        let fx = fixture();
        let account = fx.account_with(100).await;

        let receipt = fx.handler.claim(&account.id).await.unwrap();
        assert_eq!(receipt.new_balance, 110);
        assert_eq!(receipt.bonus_amount, 10);

        let history = fx.all_transactions(&account.id).await;
        let latest = &history[0];
        assert_eq!(latest.kind, TransactionKind::Earn);
        assert_eq!(latest.amount, 10);
        assert_eq!(latest.description, DAILY_BONUS_DESCRIPTION);
        assert_eq!(latest.category, BONUS_CATEGORY);
        fx.assert_ledger_consistent(&account.id).await;
    }

    #[tokio::test]
    async fn second_claim_same_day_is_rejected() {
        let fx = fixture();
        let account = fx.account_with(100).await;

        fx.handler.claim(&account.id).await.unwrap();
        fx.clock.advance(ChronoDuration::hours(11));
        let second = fx.handler.claim(&account.id).await;

        assert!(matches!(second, Err(LedgerError::AlreadyClaimedToday)));
        let stored = fx.store.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, 110);
        assert_eq!(fx.all_transactions(&account.id).await.len(), 2);
    }

    #[tokio::test]
    async fn claim_is_available_again_after_utc_midnight() {
        let fx = fixture();
        let account = fx.account_with(0).await;

        fx.handler.claim(&account.id).await.unwrap();
        fx.clock.advance(ChronoDuration::hours(12));
        let receipt = fx.handler.claim(&account.id).await.unwrap();

        assert_eq!(receipt.new_balance, 20);
        fx.assert_ledger_consistent(&account.id).await;
    }

    #[tokio::test]
    async fn concurrent_claims_succeed_exactly_once() {
        let fx = fixture();
        let account = fx.account_with(100).await;

        let claims = (0..16).map(|_| {
            let handler = fx.handler.clone();
            let id = account.id.clone();
            tokio::spawn(async move { handler.claim(&id).await })
        });
        let results: Vec<_> = join_all(claims)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::AlreadyClaimedToday)))
            .count();
        assert_eq!(succeeded, 1);
        assert_eq!(rejected, 15);

        let stored = fx.store.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, 110);
        fx.assert_ledger_consistent(&account.id).await;
    }

    #[tokio::test]
    async fn claim_for_unknown_account_is_not_found() {
        let fx = fixture();
        let result = fx.handler.claim("nobody").await;
        assert!(matches!(result, Err(LedgerError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn overspend_leaves_balance_and_history_unchanged() {
        let fx = fixture();
        let account = fx.account_with(5).await;

        let result = fx.handler.spend(&account.id, request(10, "Badge")).await;

        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance {
                balance: 5,
                requested: 10
            })
        ));
        let stored = fx.store.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, 5);
        assert_eq!(fx.all_transactions(&account.id).await.len(), 1);
    }

    #[tokio::test]
    async fn earn_and_spend_keep_ledger_consistent() {
        let fx = fixture();
        let account = fx.account_with(100).await;

        fx.handler
            .earn(&account.id, request(20, "Quiz completed"))
            .await
            .unwrap();
        fx.handler
            .spend(&account.id, request(45, "Badge purchase"))
            .await
            .unwrap();
        fx.handler.claim(&account.id).await.unwrap();
        let receipt = fx
            .handler
            .earn(&account.id, request(7, "Task completed"))
            .await
            .unwrap();

        assert_eq!(receipt.new_balance, 100 + 20 - 45 + 10 + 7);
        assert_eq!(receipt.transaction.category, "earn");
        fx.assert_ledger_consistent(&account.id).await;
    }

    #[tokio::test]
    async fn invalid_writes_are_rejected_before_storage() {
        let fx = fixture();
        let account = fx.account_with(100).await;

        let cases = [
            TransactionRequest {
                amount: None,
                description: Some("Quiz".to_string()),
                category: None,
            },
            TransactionRequest {
                amount: Some(0),
                description: Some("Quiz".to_string()),
                category: None,
            },
            TransactionRequest {
                amount: Some(-3),
                description: Some("Quiz".to_string()),
                category: None,
            },
            TransactionRequest {
                amount: Some(3),
                description: Some("   ".to_string()),
                category: None,
            },
        ];

        for case in cases {
            let result = fx.handler.earn(&account.id, case).await;
            assert!(matches!(result, Err(LedgerError::InvalidInput(_))));
        }
        assert_eq!(fx.all_transactions(&account.id).await.len(), 1);
    }

    #[tokio::test]
    async fn record_dispatches_on_kind() {
        let fx = fixture();
        let account = fx.account_with(50).await;

        let receipt = fx
            .handler
            .record(
                &account.id,
                RecordTransactionRequest {
                    kind: Some("spend".to_string()),
                    amount: Some(20),
                    description: Some("Avatar".to_string()),
                    category: Some("shop".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(receipt.new_balance, 30);
        assert_eq!(receipt.transaction.kind, TransactionKind::Spend);
        assert_eq!(receipt.transaction.category, "shop");

        let unknown = fx
            .handler
            .record(
                &account.id,
                RecordTransactionRequest {
                    kind: Some("gift".to_string()),
                    amount: Some(20),
                    description: Some("Avatar".to_string()),
                    category: None,
                },
            )
            .await;
        assert!(matches!(unknown, Err(LedgerError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn history_pages_newest_first() {
        let fx = fixture();
        let account = fx.account_with(0).await;
        for n in 1..=25 {
            fx.handler
                .earn(&account.id, request(n, &format!("Quiz {}", n)))
                .await
                .unwrap();
        }

        let page = fx
            .handler
            .history(
                &account.id,
                HistoryQuery {
                    page: Some(2),
                    page_size: Some(10),
                },
            )
            .await
            .unwrap();

        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);
        let amounts: Vec<i64> = page.items.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, (6..=15).rev().collect::<Vec<i64>>());

        let last = fx
            .handler
            .history(
                &account.id,
                HistoryQuery {
                    page: Some(3),
                    page_size: Some(10),
                },
            )
            .await
            .unwrap();
        assert_eq!(last.items.len(), 5);

        let past_end = fx
            .handler
            .history(
                &account.id,
                HistoryQuery {
                    page: Some(4),
                    page_size: Some(10),
                },
            )
            .await
            .unwrap();
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 25);
    }

    #[tokio::test]
    async fn history_validates_paging_and_account() {
        let fx = fixture();
        let account = fx.account_with(0).await;

        for (page, page_size) in [(Some(0), None), (None, Some(0)), (None, Some(101))] {
            let result = fx
                .handler
                .history(&account.id, HistoryQuery { page, page_size })
                .await;
            assert!(matches!(result, Err(LedgerError::InvalidInput(_))));
        }

        let empty = fx
            .handler
            .history(
                &account.id,
                HistoryQuery {
                    page: None,
                    page_size: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(empty.page_size, 20);
        assert_eq!(empty.total_pages, 0);

        let missing = fx
            .handler
            .history(
                "nobody",
                HistoryQuery {
                    page: None,
                    page_size: None,
                },
            )
            .await;
        assert!(matches!(missing, Err(LedgerError::AccountNotFound(_))));
    }
}
