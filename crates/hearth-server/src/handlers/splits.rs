//! Allocation split handlers

use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use serde::Deserialize;

use crate::{
    get_user_email, parse_domain, read_json, ApiResponse, ApiResult, AppError, AppState,
    MAX_PAGE_LIMIT,
};
use hearth_core::models::{
    PaymentUpdate, SplitAllocation, SplitAudit, SplitDetails, SplitUpdateOutcome, UserBalance,
};
use hearth_core::SplitRequest;

/// GET /api/:domain/transactions/:id/allocations - Allocations, or the legacy view
pub async fn get_allocations(
    State(state): State<Arc<AppState>>,
    Path((domain, id)): Path<(String, i64)>,
) -> ApiResult<SplitDetails> {
    let ty = parse_domain(&domain)?;
    let details = state.db.get_split_details(ty, id, &state.household)?;
    Ok(ApiResponse::ok(details))
}

/// POST /api/:domain/transactions/:id/allocations - Split a transaction among users
pub async fn create_allocations(
    State(state): State<Arc<AppState>>,
    Path((domain, id)): Path<(String, i64)>,
    request: Request,
) -> ApiResult<SplitDetails> {
    let ty = parse_domain(&domain)?;
    let user_email = get_user_email(request.headers());
    let mut req: SplitRequest = read_json(request).await?;
    if req.created_by.is_none() {
        req.created_by = Some(user_email.clone());
    }

    let details = state
        .db
        .create_split_config(ty, id, &req, &state.household)?;

    state.db.log_audit(
        &user_email,
        "create",
        Some("split_config"),
        Some(id),
        Some(&format!(
            "domain={}, type={}, users={}",
            ty,
            req.split_type.as_deref().unwrap_or_default(),
            details.view.allocation_count()
        )),
    )?;

    Ok(ApiResponse::ok(details))
}

/// PUT /api/:domain/transactions/:id/allocations - Replace allocations
pub async fn update_allocations(
    State(state): State<Arc<AppState>>,
    Path((domain, id)): Path<(String, i64)>,
    request: Request,
) -> ApiResult<SplitUpdateOutcome> {
    let ty = parse_domain(&domain)?;
    let user_email = get_user_email(request.headers());
    let req: SplitRequest = read_json(request).await?;

    let outcome = state
        .db
        .update_split_config(ty, id, &req, &state.household)?;

    if outcome.no_op {
        return Ok(ApiResponse::with_message(outcome, "No changes"));
    }

    state.db.log_audit(
        &user_email,
        "update",
        Some("split_config"),
        Some(id),
        Some(&format!(
            "domain={}, users={}",
            ty,
            outcome.details.view.allocation_count()
        )),
    )?;

    Ok(ApiResponse::ok(outcome))
}

/// DELETE /api/:domain/transactions/:id/allocations - Remove a configuration
///
/// Returns the audit record holding the deleted configuration.
pub async fn delete_allocations(
    State(state): State<Arc<AppState>>,
    Path((domain, id)): Path<(String, i64)>,
    request: Request,
) -> ApiResult<SplitAudit> {
    let ty = parse_domain(&domain)?;
    let user_email = get_user_email(request.headers());

    let audit = state.db.delete_split_config(ty, id, &user_email)?;

    state.db.log_audit(
        &user_email,
        "delete",
        Some("split_config"),
        Some(id),
        Some(&format!("domain={}, audit_id={}", ty, audit.id)),
    )?;

    Ok(ApiResponse::with_message(audit, "Split configuration deleted"))
}

/// PATCH /api/allocations/:id/payment - Mark an allocation paid or unpaid
pub async fn update_allocation_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<SplitAllocation> {
    let user_email = get_user_email(request.headers());
    let update: PaymentUpdate = read_json(request).await?;

    let allocation = state.db.update_allocation_payment(id, &update)?;

    state.db.log_audit(
        &user_email,
        "payment",
        Some("split_allocation"),
        Some(id),
        Some(&format!("is_paid={}", allocation.is_paid)),
    )?;

    Ok(ApiResponse::ok(allocation))
}

/// GET /api/:domain/balances - Who owes what in a domain
pub async fn list_balances(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> ApiResult<Vec<UserBalance>> {
    let ty = parse_domain(&domain)?;
    Ok(ApiResponse::ok(state.db.user_balances(ty, &state.household)?))
}

/// Query parameters for the split audit log
#[derive(Debug, Deserialize)]
pub struct SplitAuditQuery {
    pub domain: Option<String>,
    pub transaction_id: Option<i64>,
    #[serde(default = "default_audit_limit")]
    pub limit: i64,
}

fn default_audit_limit() -> i64 {
    100
}

/// GET /api/split-audit - Deleted split configurations, newest first
pub async fn list_split_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SplitAuditQuery>,
) -> ApiResult<Vec<SplitAudit>> {
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);

    let filter = match (params.domain.as_deref(), params.transaction_id) {
        (Some(domain), Some(id)) => Some((parse_domain(domain)?, id)),
        (None, None) => None,
        _ => {
            return Err(AppError::bad_request(
                "domain and transaction_id must be given together",
            ))
        }
    };

    Ok(ApiResponse::ok(state.db.list_split_audit(filter, limit)?))
}
