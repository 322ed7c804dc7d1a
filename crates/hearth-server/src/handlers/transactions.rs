//! Transaction handlers

use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    get_user_email, parse_domain, read_json, ApiResponse, ApiResult, AppError, AppState,
    MAX_PAGE_LIMIT,
};
use hearth_core::models::{
    AmountSplitOutcome, AmountSplitRequest, BulkMarkOutcome, BulkMarkRequest, Transaction,
    TransactionQuery, UpdateOutcome,
};
use hearth_core::LabeledListing;

/// Query parameters for listing transactions
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    /// Inclusive start date (YYYY-MM-DD)
    pub start_date: Option<NaiveDate>,
    /// Inclusive end date (YYYY-MM-DD)
    pub end_date: Option<NaiveDate>,
    pub has_split: Option<bool>,
    pub mark: Option<bool>,
    /// Effective label filter; "null" selects unallocated rows
    pub label: Option<String>,
}

fn default_limit() -> i64 {
    200
}

/// GET /api/:domain/transactions - List transactions with effective labels
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
    Query(params): Query<ListTransactionsQuery>,
) -> ApiResult<LabeledListing> {
    let ty = parse_domain(&domain)?;

    // Input validation: clamp pagination parameters
    let query = TransactionQuery {
        start_date: params.start_date,
        end_date: params.end_date,
        has_split: params.has_split,
        mark: params.mark,
        limit: Some(params.limit.clamp(1, MAX_PAGE_LIMIT)),
        offset: Some(params.offset.max(0)),
    };

    let listing = state.db.list_labeled_transactions(
        ty,
        &query,
        params.label.as_deref(),
        &state.household,
    )?;

    Ok(ApiResponse::ok(listing))
}

/// POST /api/:domain/transactions - Create a transaction
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
    request: Request,
) -> ApiResult<Transaction> {
    let ty = parse_domain(&domain)?;
    let user_email = get_user_email(request.headers());
    let payload: Map<String, Value> = read_json(request).await?;

    let transaction = state.db.create_transaction_from_payload(ty, &payload)?;

    state.db.log_audit(
        &user_email,
        "create",
        Some(ty.table_name()),
        Some(transaction.id),
        Some(&format!("amount={:.2}", transaction.amount)),
    )?;

    Ok(ApiResponse::ok(transaction))
}

/// GET /api/:domain/transactions/:id - Get a single transaction
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path((domain, id)): Path<(String, i64)>,
) -> ApiResult<Transaction> {
    let ty = parse_domain(&domain)?;

    let transaction = state
        .db
        .get_transaction(ty, id)?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;

    Ok(ApiResponse::ok(transaction))
}

/// PUT /api/:domain/transactions/:id - Partial update, skipped when nothing changes
pub async fn update_transaction(
    State(state): State<Arc<AppState>>,
    Path((domain, id)): Path<(String, i64)>,
    request: Request,
) -> ApiResult<UpdateOutcome> {
    let ty = parse_domain(&domain)?;
    let user_email = get_user_email(request.headers());
    let payload: Map<String, Value> = read_json(request).await?;

    let outcome = state.db.update_transaction(ty, id, &payload)?;

    if outcome.no_op {
        return Ok(ApiResponse::with_message(outcome, "No changes"));
    }

    state.db.log_audit(
        &user_email,
        "update",
        Some(ty.table_name()),
        Some(id),
        Some(&format!("fields={}", outcome.changed_fields.join(","))),
    )?;

    Ok(ApiResponse::ok(outcome))
}

/// POST /api/:domain/transactions/bulk-mark - Set `mark` across a filtered set
pub async fn bulk_mark_transactions(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
    request: Request,
) -> ApiResult<BulkMarkOutcome> {
    let ty = parse_domain(&domain)?;
    let user_email = get_user_email(request.headers());
    let req: BulkMarkRequest = read_json(request).await?;

    let outcome = state.db.bulk_mark(ty, &req)?;

    if outcome.no_op {
        return Ok(ApiResponse::with_message(outcome, "No changes"));
    }

    state.db.log_audit(
        &user_email,
        "bulk_mark",
        Some(ty.table_name()),
        None,
        Some(&format!(
            "mark={}, matched={}, updated={}",
            req.mark, outcome.matched, outcome.updated
        )),
    )?;

    Ok(ApiResponse::ok(outcome))
}

/// POST /api/:domain/transactions/split - Break a transaction into several rows
pub async fn split_transaction(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
    request: Request,
) -> ApiResult<AmountSplitOutcome> {
    let ty = parse_domain(&domain)?;
    let user_email = get_user_email(request.headers());
    let req: AmountSplitRequest = read_json(request).await?;

    let outcome = state.db.split_transaction(ty, &req)?;

    let created: Vec<String> = outcome.created.iter().map(|t| t.id.to_string()).collect();
    state.db.log_audit(
        &user_email,
        "split",
        Some(ty.table_name()),
        Some(outcome.original.id),
        Some(&format!(
            "remaining={:.2}, created={}",
            outcome.original.amount,
            created.join(",")
        )),
    )?;

    Ok(ApiResponse::ok(outcome))
}
