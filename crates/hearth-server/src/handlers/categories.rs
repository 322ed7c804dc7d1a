//! Per-domain category handlers

use std::sync::Arc;

use axum::extract::{Path, Request, State};
use serde::Deserialize;

use crate::{get_user_email, parse_domain, read_json, ApiResponse, ApiResult, AppState};
use hearth_core::models::Category;

/// GET /api/:domain/categories - List a domain's categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> ApiResult<Vec<Category>> {
    let ty = parse_domain(&domain)?;
    Ok(ApiResponse::ok(state.db.list_categories(ty)?))
}

/// Request body for creating a category
#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub category: String,
}

/// POST /api/:domain/categories - Create a category (idempotent by name)
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
    request: Request,
) -> ApiResult<Category> {
    let ty = parse_domain(&domain)?;
    let user_email = get_user_email(request.headers());
    let req: CreateCategoryRequest = read_json(request).await?;

    let category = state.db.create_category(ty, &req.category)?;

    state.db.log_audit(
        &user_email,
        "create",
        Some(ty.category_table()),
        Some(category.id),
        Some(&category.category),
    )?;

    Ok(ApiResponse::ok(category))
}
