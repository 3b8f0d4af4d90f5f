use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    response::IntoResponse,
    Json,
};

use super::{dispatch, AppState};
use crate::error::LedgerError;
use crate::models::transactions::{HistoryQuery, RecordTransactionRequest, TransactionRequest};
use crate::services::ledger::LedgerRequest;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, LedgerError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|e| LedgerError::InvalidInput(e.body_text()))
}

pub async fn claim_daily_bonus(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<impl IntoResponse, LedgerError> {
    let receipt = dispatch(&state.ledger_channel, |response| LedgerRequest::Claim {
        account_id,
        response,
    })
    .await?;

    Ok(Json(receipt))
}

pub async fn earn_coins(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let request = body(payload)?;
    let receipt = dispatch(&state.ledger_channel, |response| LedgerRequest::Earn {
        account_id,
        request,
        response,
    })
    .await?;

    Ok(Json(receipt))
}

pub async fn spend_coins(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let request = body(payload)?;
    let receipt = dispatch(&state.ledger_channel, |response| LedgerRequest::Spend {
        account_id,
        request,
        response,
    })
    .await?;

    Ok(Json(receipt))
}

pub async fn record_transaction(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    payload: Result<Json<RecordTransactionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let request = body(payload)?;
    let receipt = dispatch(&state.ledger_channel, |response| LedgerRequest::Record {
        account_id,
        request,
        response,
    })
    .await?;

    Ok(Json(receipt))
}

pub async fn get_transactions(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let Query(query) = query.map_err(|e| LedgerError::InvalidInput(e.body_text()))?;
    let page = dispatch(&state.ledger_channel, |response| LedgerRequest::History {
        account_id,
        query,
        response,
    })
    .await?;

    Ok(Json(page))
}
