use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::api::requests::{DepositRequest, TransactionHistoryQuery, TransferRequest};
use crate::api::responses::{
    ApiResponse, BalanceResponse, DepositResponse, ErrorResponse, TransactionResponse,
    TransferResponse, ValidationErrorDetail,
};
use crate::error::LedgerError;
use crate::models::AccountId;
use crate::observability::AggregatedHealth;

use super::routes::AppState;

pub type ApiError = (StatusCode, Json<ApiResponse<()>>);
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Maps a ledger error onto its HTTP status and error body.
pub fn error_response(err: LedgerError) -> ApiError {
    let status = match &err {
        LedgerError::InvalidAmount(_)
        | LedgerError::InvalidRequest(_)
        | LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::Config(_) | LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = match &err {
        LedgerError::Unavailable(_) => {
            tracing::error!("Storage unavailable: {}", err);
            ErrorResponse::new(
                err.code(),
                "Storage temporarily unavailable; the operation may or may not have been applied",
            )
            .retryable()
        }
        LedgerError::Config(_) | LedgerError::Internal(_) => {
            tracing::error!("Internal error: {:?}", err);
            ErrorResponse::new(err.code(), "An internal error occurred")
        }
        _ => ErrorResponse::new(err.code(), err.to_string()),
    };

    (status, Json(ApiResponse::<()>::error(body)))
}

fn invalid_request(detail: impl std::fmt::Display) -> ApiError {
    tracing::debug!("Rejected request: {}", detail);
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(ErrorResponse::new(
            "INVALID_REQUEST",
            "invalid request",
        ))),
    )
}

fn validation_failed(errors: validator::ValidationErrors) -> ApiError {
    let mut details: Vec<ValidationErrorDetail> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| ValidationErrorDetail {
                field: field.to_string(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            })
        })
        .collect();
    details.sort_by(|a, b| a.field.cmp(&b.field));

    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(
            ErrorResponse::new("VALIDATION_ERROR", "Request validation failed").with_details(details),
        )),
    )
}

// ============================================================================
// Ledger Handlers
// ============================================================================

/// Credit an account.
pub async fn deposit(
    State(state): State<AppState>,
    path: Result<Path<AccountId>, PathRejection>,
    body: Result<Json<DepositRequest>, JsonRejection>,
) -> ApiResult<DepositResponse> {
    let Path(account_id) = path.map_err(invalid_request)?;
    let Json(request) = body.map_err(invalid_request)?;
    request.validate().map_err(validation_failed)?;

    let receipt = state
        .service
        .deposit(account_id, request.amount)
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::success(DepositResponse::from(receipt))))
}

/// Move funds between two accounts.
pub async fn transfer(
    State(state): State<AppState>,
    body: Result<Json<TransferRequest>, JsonRejection>,
) -> ApiResult<TransferResponse> {
    let Json(request) = body.map_err(invalid_request)?;
    request.validate().map_err(validation_failed)?;

    let receipt = state
        .service
        .transfer(request.sender_id, request.receiver_id, request.amount)
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::success(TransferResponse::from(receipt))))
}

/// Most recent transactions of an account, newest first.
pub async fn get_transactions(
    State(state): State<AppState>,
    path: Result<Path<AccountId>, PathRejection>,
    query: Result<Query<TransactionHistoryQuery>, QueryRejection>,
) -> ApiResult<Vec<TransactionResponse>> {
    let Path(account_id) = path.map_err(invalid_request)?;
    let Query(query) = query.map_err(invalid_request)?;
    let limit = query.limit.unwrap_or(state.default_history_limit);

    let records = state
        .service
        .recent_transactions(account_id, limit)
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::success(
        records.into_iter().map(TransactionResponse::from).collect(),
    )))
}

/// Current balance of an account.
pub async fn get_balance(
    State(state): State<AppState>,
    path: Result<Path<AccountId>, PathRejection>,
) -> ApiResult<BalanceResponse> {
    let Path(account_id) = path.map_err(invalid_request)?;

    let account = state
        .service
        .balance(account_id)
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::success(BalanceResponse::from(account))))
}

// ============================================================================
// Operational Handlers
// ============================================================================

/// Health check endpoint.
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<AggregatedHealth>>) {
    let health = state.health_checker.check_all().await;
    let status = if health.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status, Json(ApiResponse::success(health)))
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> (StatusCode, String) {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}
