use async_trait::async_trait;
use sqlx::{PgPool, Postgres};

use super::LedgerStore;
use crate::error::LedgerError;
use crate::models::{
    accounts::Account,
    leaderboard::LeaderboardEntry,
    transactions::{LedgerMutation, Transaction},
};

const ACCOUNT_COLUMNS: &str =
    "id, display_name, balance, last_claim_date, created_at, updated_at";
const TRANSACTION_COLUMNS: &str =
    "id, account_id, kind, amount, description, category, created_at";

#[derive(Clone)]
pub struct LedgerRepository {
    conn: PgPool,
}

impl LedgerRepository {
    pub fn new(conn: PgPool) -> Self {
        LedgerRepository { conn }
    }

    pub async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::migrate!("./migrations").run(&self.conn).await?;
        Ok(())
    }

    async fn insert_transaction(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        transaction: &Transaction,
    ) -> Result<Transaction, LedgerError> {
        let inserted = sqlx::query_as::<_, Transaction>(&format!(
            r#"INSERT INTO transactions
            (id, account_id, kind, amount, description, category, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TRANSACTION_COLUMNS}"#
        ))
        .bind(&transaction.id)
        .bind(&transaction.account_id)
        .bind(transaction.kind.as_str())
        .bind(transaction.amount)
        .bind(&transaction.description)
        .bind(&transaction.category)
        .bind(transaction.created_at)
        .fetch_one(&mut **tx)
        .await?;

        Ok(inserted)
    }

    async fn update_account(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        account: &Account,
    ) -> Result<Account, LedgerError> {
        let updated = sqlx::query_as::<_, Account>(&format!(
            r#"UPDATE accounts
            SET balance = $1, last_claim_date = $2, updated_at = $3
            WHERE id = $4
            RETURNING {ACCOUNT_COLUMNS}"#
        ))
        .bind(account.balance)
        .bind(account.last_claim_date)
        .bind(account.updated_at)
        .bind(&account.id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(updated)
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    async fn insert_account(
        &self,
        account: Account,
        opening: Option<LedgerMutation>,
    ) -> Result<Account, LedgerError> {
        let mut tx = self.conn.begin().await?;

        let mut account = sqlx::query_as::<_, Account>(&format!(
            r#"INSERT INTO accounts
            (id, display_name, balance, last_claim_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ACCOUNT_COLUMNS}"#
        ))
        .bind(&account.id)
        .bind(&account.display_name)
        .bind(account.balance)
        .bind(account.last_claim_date)
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(mutation) = opening {
            let balance = account.apply(&mutation)?;
            account.commit(&mutation, balance);
            account = Self::update_account(&mut tx, &account).await?;
            Self::insert_transaction(&mut tx, &Transaction::record(&account.id, &mutation))
                .await?;
        }

        tx.commit().await?;

        Ok(account)
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, LedgerError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(account_id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(account)
    }

    async fn apply_mutation(
        &self,
        account_id: &str,
        mutation: LedgerMutation,
    ) -> Result<(Account, Transaction), LedgerError> {
        let mut tx = self.conn.begin().await?;

        // Row lock: concurrent mutations of this account queue here until commit.
        let mut account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE"
        ))
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        // Dropping `tx` on a rejected mutation rolls back and releases the lock.
        let mutation = mutation.not_before(account.updated_at);
        let balance = account.apply(&mutation)?;
        account.commit(&mutation, balance);

        let account = Self::update_account(&mut tx, &account).await?;
        let transaction =
            Self::insert_transaction(&mut tx, &Transaction::record(account_id, &mutation)).await?;

        tx.commit().await?;

        Ok((account, transaction))
    }

    async fn top_accounts(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        let entries = sqlx::query_as::<_, LeaderboardEntry>(
            r#"SELECT id AS account_id, display_name, balance
            FROM accounts
            ORDER BY balance DESC, id COLLATE "C" ASC
            LIMIT $1"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.conn)
        .await?;

        Ok(entries)
    }

    async fn list_transactions(
        &self,
        account_id: &str,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            r#"SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE account_id = $1
            ORDER BY seq DESC
            OFFSET $2 LIMIT $3"#
        ))
        .bind(account_id)
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.conn)
        .await?;

        Ok(transactions)
    }

    async fn count_transactions(&self, account_id: &str) -> Result<u64, LedgerError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM transactions WHERE account_id = $1")
                .bind(account_id)
                .fetch_one(&self.conn)
                .await?;

        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::transactions::TransactionKind;

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn rejected_spend_leaves_no_trace(pool: PgPool) {
        let repository = LedgerRepository::new(pool);
        let now = Utc::now();
        let account = repository
            .insert_account(
                Account::new("bob".to_string(), now),
                Some(LedgerMutation::welcome_bonus(5, now)),
            )
            .await
            .unwrap();

        let spend = LedgerMutation::new(
            TransactionKind::Spend,
            10,
            "Badge purchase".to_string(),
            None,
            now,
        );
        let result = repository.apply_mutation(&account.id, spend).await;
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance { .. })
        ));

        let stored = repository.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, 5);
        assert_eq!(repository.count_transactions(&account.id).await.unwrap(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn concurrent_claims_award_once(pool: PgPool) {
        let repository = LedgerRepository::new(pool);
        let now = Utc::now();
        let account = repository
            .insert_account(Account::new("carol".to_string(), now), None)
            .await
            .unwrap();

        let claims = (0..8).map(|_| {
            let repository = repository.clone();
            let id = account.id.clone();
            tokio::spawn(async move {
                repository
                    .apply_mutation(&id, LedgerMutation::daily_bonus(10, now))
                    .await
            })
        });
        let results = futures_util::future::join_all(claims).await;
        let awarded = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();

        assert_eq!(awarded, 1);
        let stored = repository.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, 10);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn stale_claim_does_not_rewind_claim_day(pool: PgPool) {
        let repository = LedgerRepository::new(pool);
        let day_two = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 1).unwrap();
        let account = repository
            .insert_account(Account::new("erin".to_string(), day_two), None)
            .await
            .unwrap();

        repository
            .apply_mutation(&account.id, LedgerMutation::daily_bonus(10, day_two))
            .await
            .unwrap();
        let day_one = Utc.with_ymd_and_hms(2025, 3, 1, 23, 59, 59).unwrap();
        let stale = repository
            .apply_mutation(&account.id, LedgerMutation::daily_bonus(10, day_one))
            .await;
        assert!(matches!(stale, Err(LedgerError::AlreadyClaimedToday)));

        let stored = repository.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, 10);
        assert_eq!(stored.last_claim_date, Some(day_two.date_naive()));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn transactions_come_back_newest_first(pool: PgPool) {
        let repository = LedgerRepository::new(pool);
        let now = Utc::now();
        let account = repository
            .insert_account(Account::new("dave".to_string(), now), None)
            .await
            .unwrap();

        for amount in 1..=3 {
            let earn = LedgerMutation::new(
                TransactionKind::Earn,
                amount,
                format!("Quiz {}", amount),
                None,
                now,
            );
            repository.apply_mutation(&account.id, earn).await.unwrap();
        }

        let page = repository
            .list_transactions(&account.id, 0, 10)
            .await
            .unwrap();
        let amounts: Vec<i64> = page.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![3, 2, 1]);
    }
}
