//! Reference data handlers (directories and the initial-data bundle)

use std::sync::Arc;

use axum::extract::State;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::{ApiResponse, ApiResult, AppState};
use hearth_core::db::Database;
use hearth_core::models::{Category, SplitType, SplitTypeInfo, TransactionType, TransactionTypeInfo, User};

/// Category lists for every domain
#[derive(Debug, Serialize)]
pub struct DomainCategories {
    pub shared: Vec<Category>,
    pub personal: Vec<Category>,
    pub offset: Vec<Category>,
}

/// Everything a client needs before its first screen
#[derive(Debug, Serialize)]
pub struct InitialData {
    pub users: Vec<User>,
    pub split_types: Vec<SplitTypeInfo>,
    pub transaction_types: Vec<TransactionTypeInfo>,
    pub categories: DomainCategories,
}

fn split_types() -> Vec<SplitTypeInfo> {
    SplitType::all().iter().copied().map(SplitTypeInfo::from).collect()
}

fn transaction_types() -> Vec<TransactionTypeInfo> {
    TransactionType::all()
        .iter()
        .copied()
        .map(TransactionTypeInfo::from)
        .collect()
}

/// Run a read on the blocking pool with its own handle to the database
fn blocking<T, F>(db: &Database, f: F) -> JoinHandle<hearth_core::Result<T>>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> hearth_core::Result<T> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
}

/// GET /api/initial-data - Users, directories and categories in one response
pub async fn get_initial_data(State(state): State<Arc<AppState>>) -> ApiResult<InitialData> {
    let (users, shared, personal, offset) = tokio::try_join!(
        blocking(&state.db, |db| db.active_users()),
        blocking(&state.db, |db| db.list_categories(TransactionType::Shared)),
        blocking(&state.db, |db| db.list_categories(TransactionType::Personal)),
        blocking(&state.db, |db| db.list_categories(TransactionType::Offset)),
    )?;

    Ok(ApiResponse::ok(InitialData {
        users: users?,
        split_types: split_types(),
        transaction_types: transaction_types(),
        categories: DomainCategories {
            shared: shared?,
            personal: personal?,
            offset: offset?,
        },
    }))
}

/// GET /api/split-types - Supported split strategies
pub async fn list_split_types() -> ApiResult<Vec<SplitTypeInfo>> {
    Ok(ApiResponse::ok(split_types()))
}

/// GET /api/transaction-types - Transaction domain directory
pub async fn list_transaction_types() -> ApiResult<Vec<TransactionTypeInfo>> {
    Ok(ApiResponse::ok(transaction_types()))
}
