//! Household member handlers

use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use serde::Deserialize;

use crate::{get_user_email, read_json, ApiResponse, ApiResult, AppState};
use hearth_core::models::User;

/// Query parameters for listing users
#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    /// Include deactivated members
    #[serde(default)]
    pub include_inactive: bool,
}

/// GET /api/users - List household members
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UsersQuery>,
) -> ApiResult<Vec<User>> {
    let users = if params.include_inactive {
        state.db.list_users()?
    } else {
        state.db.active_users()?
    };
    Ok(ApiResponse::ok(users))
}

/// Request body for creating a user
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub display_name: String,
}

/// POST /api/users - Add a household member
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> ApiResult<User> {
    let user_email = get_user_email(request.headers());
    let req: CreateUserRequest = read_json(request).await?;

    let user = state.db.create_user(&req.username, &req.display_name)?;

    state.db.log_audit(
        &user_email,
        "create",
        Some("user"),
        Some(user.id),
        Some(&format!("username={}", user.username)),
    )?;

    Ok(ApiResponse::ok(user))
}

/// POST /api/users/:id/deactivate - Deactivate a member
pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<User> {
    let user_email = get_user_email(request.headers());

    let user = state.db.deactivate_user(id)?;

    state
        .db
        .log_audit(&user_email, "deactivate", Some("user"), Some(id), None)?;

    Ok(ApiResponse::ok(user))
}
