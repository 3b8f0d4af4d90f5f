use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::repositories::LedgerStore;
use crate::settings::Settings;
use crate::utils::Clock;

mod accounts;
pub mod http;
mod leaderboard;
mod ledger;

const CHANNEL_CAPACITY: usize = 512;

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Spawns the account, ledger and leaderboard service loops and returns the
/// channels the HTTP layer talks to.
pub fn spawn_services(
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    settings: &Settings,
) -> http::AppState {
    let (account_tx, mut account_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (ledger_tx, mut ledger_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (leaderboard_tx, mut leaderboard_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let mut account_service = accounts::AccountService::new();
    let mut ledger_service = ledger::LedgerService::new();
    let mut leaderboard_service = leaderboard::LeaderboardService::new();

    log::info!("Starting account service.");
    let handler = accounts::AccountRequestHandler::new(store.clone(), clock.clone(), settings);
    tokio::spawn(async move {
        account_service.run(handler, &mut account_rx).await;
    });

    log::info!("Starting ledger service.");
    let handler = ledger::LedgerRequestHandler::new(store.clone(), clock, settings);
    tokio::spawn(async move {
        ledger_service.run(handler, &mut ledger_rx).await;
    });

    log::info!("Starting leaderboard service.");
    let handler = leaderboard::LeaderboardRequestHandler::new(store, settings);
    handler.start_refresh_task();
    tokio::spawn(async move {
        leaderboard_service.run(handler, &mut leaderboard_rx).await;
    });

    let rate_limiter = http::rate_limit::RateLimiter::from_settings(&settings.rate_limit);
    if let Some(limiter) = &rate_limiter {
        limiter.start_sweep_task();
    }

    http::AppState {
        account_channel: account_tx,
        ledger_channel: ledger_tx,
        leaderboard_channel: leaderboard_tx,
        rate_limiter,
    }
}

pub async fn start_services(
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    settings: Settings,
    listen: &str,
) -> Result<(), anyhow::Error> {
    let state = spawn_services(store, clock, &settings);

    log::info!("Starting HTTP server.");
    http::start_http_server(listen, state).await
}
