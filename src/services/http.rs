use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    http::{header::CONTENT_TYPE, Method, Uri},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{accounts::AccountRequest, leaderboard::LeaderboardRequest, ledger::LedgerRequest};
use crate::error::LedgerError;

mod accounts;
mod leaderboard;
mod ledger;
pub mod rate_limit;

use rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub(super) account_channel: mpsc::Sender<AccountRequest>,
    pub(super) ledger_channel: mpsc::Sender<LedgerRequest>,
    pub(super) leaderboard_channel: mpsc::Sender<LeaderboardRequest>,
    pub(super) rate_limiter: Option<RateLimiter>,
}

/// Sends a request to a service loop and waits for its answer.
async fn dispatch<R, T>(
    channel: &mpsc::Sender<R>,
    request: impl FnOnce(oneshot::Sender<Result<T, LedgerError>>) -> R,
) -> Result<T, LedgerError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(request(response_tx))
        .await
        .map_err(|e| LedgerError::Internal(format!("Failed to process request: {}", e)))?;

    response_rx
        .await
        .map_err(|e| LedgerError::Internal(format!("Failed to receive response: {}", e)))?
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn route_not_found(uri: Uri) -> LedgerError {
    LedgerError::RouteNotFound(uri.path().to_string())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let rate_limiter = state.rate_limiter.clone();

    let app: Router = Router::new()
        .route("/health", get(health))
        .route("/accounts", post(accounts::create_account))
        .route("/accounts/{id}", get(accounts::get_account_profile))
        .route("/accounts/{id}/claim", post(ledger::claim_daily_bonus))
        .route("/accounts/{id}/earn", post(ledger::earn_coins))
        .route("/accounts/{id}/spend", post(ledger::spend_coins))
        .route(
            "/accounts/{id}/transactions",
            get(ledger::get_transactions).post(ledger::record_transaction),
        )
        .route("/leaderboard", get(leaderboard::get_leaderboard))
        .route("/leaderboard/refresh", post(leaderboard::refresh_leaderboard))
        .fallback(route_not_found)
        .with_state(state);

    let app = match rate_limiter {
        Some(limiter) => app.layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::limit_requests,
        )),
        None => app,
    };

    app.layer(cors).layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(listen: &str, state: AppState) -> Result<(), anyhow::Error> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    log::info!("HTTP server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        log::info!("Received Ctrl+C, shutting down.");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                log::info!("Received terminate signal, shutting down.");
            }
            Err(e) => {
                log::error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
