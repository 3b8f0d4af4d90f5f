use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::IntoResponse,
    Json,
};

use super::{dispatch, AppState};
use crate::error::LedgerError;
use crate::models::leaderboard::LeaderboardQuery;
use crate::services::leaderboard::LeaderboardRequest;

pub async fn get_leaderboard(
    State(state): State<AppState>,
    query: Result<Query<LeaderboardQuery>, QueryRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let Query(query) = query.map_err(|e| LedgerError::InvalidInput(e.body_text()))?;
    let entries = dispatch(&state.leaderboard_channel, |response| {
        LeaderboardRequest::GetTop {
            limit: query.limit,
            response,
        }
    })
    .await?;

    Ok(Json(entries))
}

pub async fn refresh_leaderboard(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, LedgerError> {
    let entries = dispatch(&state.leaderboard_channel, |response| {
        LeaderboardRequest::Refresh { response }
    })
    .await?;

    Ok(Json(entries))
}
