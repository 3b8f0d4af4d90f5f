use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use super::{dispatch, AppState};
use crate::error::LedgerError;
use crate::models::accounts::NewAccount;
use crate::services::accounts::AccountRequest;

pub async fn create_account(
    State(state): State<AppState>,
    payload: Result<Json<NewAccount>, JsonRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let Json(request) = payload.map_err(|e| LedgerError::InvalidInput(e.body_text()))?;

    let account = dispatch(&state.account_channel, |response| {
        AccountRequest::CreateAccount { request, response }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn get_account_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LedgerError> {
    let profile = dispatch(&state.account_channel, |response| {
        AccountRequest::GetProfile { id, response }
    })
    .await?;

    Ok(Json(profile))
}
