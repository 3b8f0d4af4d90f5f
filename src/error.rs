use axum::{
    http::{header::RETRY_AFTER, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Daily bonus already claimed today")]
    AlreadyClaimedToday,

    #[error("Insufficient balance: {balance} available, {requested} requested")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error("Too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::AccountNotFound(_) | LedgerError::RouteNotFound(_) => "NOT_FOUND",
            LedgerError::InvalidInput(_) => "INVALID_INPUT",
            LedgerError::AlreadyClaimedToday => "ALREADY_CLAIMED",
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::RateLimited { .. } => "RATE_LIMITED",
            LedgerError::Storage(_) => "STORAGE_FAILURE",
            LedgerError::Internal(_) => "INTERNAL",
        }
    }

    /// Infrastructure faults, as opposed to requests the ledger rules turned down.
    pub fn is_fault(&self) -> bool {
        matches!(self, LedgerError::Storage(_) | LedgerError::Internal(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            LedgerError::AccountNotFound(_) | LedgerError::RouteNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            LedgerError::InvalidInput(_)
            | LedgerError::AlreadyClaimedToday
            | LedgerError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
            LedgerError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            LedgerError::Storage(_) | LedgerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Infrastructure faults are not echoed back to the caller.
        let description = match &self {
            LedgerError::Storage(_) | LedgerError::Internal(_) => {
                log::error!("Request failed: {}", self);
                "Internal server error.".to_string()
            }
            _ => self.to_string(),
        };

        let mut response = (
            status,
            Json(json!({
                "error": self.code(),
                "description": description,
            })),
        )
            .into_response();

        if let LedgerError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, retry_after_secs.into());
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_map_to_bad_request() {
        assert_eq!(
            LedgerError::AlreadyClaimedToday.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            LedgerError::InsufficientBalance {
                balance: 5,
                requested: 10
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            LedgerError::AccountNotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn storage_failure_hides_details() {
        let response = LedgerError::Storage("connection reset".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "STORAGE_FAILURE");
        assert_eq!(json["description"], "Internal server error.");
    }

    #[test]
    fn only_infrastructure_errors_are_faults() {
        assert!(LedgerError::Storage("timeout".into()).is_fault());
        assert!(LedgerError::Internal("channel closed".into()).is_fault());
        assert!(!LedgerError::AlreadyClaimedToday.is_fault());
        assert!(!LedgerError::InsufficientBalance {
            balance: 0,
            requested: 1
        }
        .is_fault());
        assert!(!LedgerError::InvalidInput("amount".into()).is_fault());
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let response = LedgerError::RateLimited {
            retry_after_secs: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "42");
    }
}
