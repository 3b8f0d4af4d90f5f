use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, RwLock};

use super::{RequestHandler, Service};
use crate::error::LedgerError;
use crate::models::leaderboard::LeaderboardEntry;
use crate::repositories::LedgerStore;
use crate::settings::Settings;
use crate::utils::with_timeout;

pub enum LeaderboardRequest {
    GetTop {
        limit: Option<u32>,
        response: oneshot::Sender<Result<Vec<LeaderboardEntry>, LedgerError>>,
    },
    Refresh {
        response: oneshot::Sender<Result<Vec<LeaderboardEntry>, LedgerError>>,
    },
}

/// Ranking snapshot holding the top `max_limit` accounts. `None` until the
/// first successful refresh.
type Snapshot = Arc<RwLock<Option<Vec<LeaderboardEntry>>>>;

#[derive(Clone)]
pub struct LeaderboardRequestHandler {
    store: Arc<dyn LedgerStore>,
    snapshot: Snapshot,
    default_limit: u32,
    max_limit: u32,
    refresh_interval: Duration,
    timeout: Duration,
}

impl LeaderboardRequestHandler {
    pub fn new(store: Arc<dyn LedgerStore>, settings: &Settings) -> Self {
        LeaderboardRequestHandler {
            store,
            snapshot: Arc::new(RwLock::new(None)),
            default_limit: settings.leaderboard.default_limit,
            max_limit: settings.leaderboard.max_limit,
            refresh_interval: Duration::from_secs(settings.leaderboard.refresh_secs.max(1)),
            timeout: settings.storage.timeout(),
        }
    }

    pub fn start_refresh_task(&self) {
        let handler = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(handler.refresh_interval);

            loop {
                interval.tick().await;

                match handler.refresh().await {
                    Ok(entries) => {
                        log::debug!("Refreshed leaderboard with {} entries.", entries.len())
                    }
                    Err(e) => {
                        log::error!("Error refreshing leaderboard: {}", e);
                    }
                }
            }
        });

        log::info!(
            "Leaderboard refresh task started, every {}s.",
            self.refresh_interval.as_secs()
        );
    }

    pub async fn refresh(&self) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        let entries =
            with_timeout(self.timeout, self.store.top_accounts(self.max_limit)).await?;

        let mut snapshot = self.snapshot.write().await;
        *snapshot = Some(entries.clone());

        Ok(entries)
    }

    pub async fn top(&self, limit: Option<u32>) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        let limit = limit.unwrap_or(self.default_limit);
        if limit == 0 {
            return Err(LedgerError::InvalidInput(
                "Limit must be at least 1".to_string(),
            ));
        }
        let limit = limit.min(self.max_limit) as usize;

        let cached = self.snapshot.read().await.clone();
        let entries = match cached {
            Some(entries) => entries,
            None => self.refresh().await?,
        };

        Ok(entries.into_iter().take(limit).collect())
    }
}

#[async_trait]
impl RequestHandler<LeaderboardRequest> for LeaderboardRequestHandler {
    async fn handle_request(&self, request: LeaderboardRequest) {
        match request {
            LeaderboardRequest::GetTop { limit, response } => {
                let entries = self.top(limit).await;
                let _ = response.send(entries);
            }
            LeaderboardRequest::Refresh { response } => {
                let entries = self.refresh().await;
                let _ = response.send(entries);
            }
        }
    }
}

pub struct LeaderboardService;

impl LeaderboardService {
    pub fn new() -> Self {
        LeaderboardService {}
    }
}

#[async_trait]
impl Service<LeaderboardRequest, LeaderboardRequestHandler> for LeaderboardService {}
