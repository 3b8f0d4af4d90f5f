use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{RequestHandler, Service};
use crate::error::LedgerError;
use crate::models::{
    accounts::{self, Account, AccountProfile, NewAccount},
    transactions::LedgerMutation,
};
use crate::repositories::LedgerStore;
use crate::settings::Settings;
use crate::utils::{with_timeout, Clock};

const RECENT_TRANSACTIONS: u32 = 5;

pub enum AccountRequest {
    CreateAccount {
        request: NewAccount,
        response: oneshot::Sender<Result<Account, LedgerError>>,
    },
    GetProfile {
        id: String,
        response: oneshot::Sender<Result<AccountProfile, LedgerError>>,
    },
}

#[derive(Clone)]
pub struct AccountRequestHandler {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    welcome_bonus: i64,
    timeout: Duration,
}

impl AccountRequestHandler {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, settings: &Settings) -> Self {
        AccountRequestHandler {
            store,
            clock,
            welcome_bonus: settings.rewards.welcome_bonus,
            timeout: settings.storage.timeout(),
        }
    }

    async fn create_account(&self, request: NewAccount) -> Result<Account, LedgerError> {
        let display_name = accounts::validate_display_name(request.display_name)?;
        let now = self.clock.now();

        let opening =
            (self.welcome_bonus > 0).then(|| LedgerMutation::welcome_bonus(self.welcome_bonus, now));
        let account = with_timeout(
            self.timeout,
            self.store
                .insert_account(Account::new(display_name, now), opening),
        )
        .await?;

        log::info!(
            "Created account {} with opening balance {}.",
            account.id,
            account.balance
        );
        Ok(account)
    }

    async fn get_profile(&self, id: &str) -> Result<AccountProfile, LedgerError> {
        let account = with_timeout(self.timeout, self.store.get_account(id))
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))?;

        let recent_transactions = with_timeout(
            self.timeout,
            self.store.list_transactions(id, 0, RECENT_TRANSACTIONS),
        )
        .await?;

        Ok(AccountProfile {
            account,
            recent_transactions,
        })
    }
}

#[async_trait]
impl RequestHandler<AccountRequest> for AccountRequestHandler {
    async fn handle_request(&self, request: AccountRequest) {
        match request {
            AccountRequest::CreateAccount { request, response } => {
                let account = self.create_account(request).await;
                let _ = response.send(account);
            }
            AccountRequest::GetProfile { id, response } => {
                let profile = self.get_profile(&id).await;
                let _ = response.send(profile);
            }
        }
    }
}

pub struct AccountService;

impl AccountService {
    pub fn new() -> Self {
        AccountService {}
    }
}

#[async_trait]
impl Service<AccountRequest, AccountRequestHandler> for AccountService {}
