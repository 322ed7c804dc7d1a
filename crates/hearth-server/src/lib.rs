//! Hearth Web Server
//!
//! Axum-based REST API for the Hearth household finance tracker.
//!
//! Every response uses one envelope: `{success, data?, error?, message?, errors?}`.
//! Domain errors from `hearth-core` map onto HTTP statuses in [`AppError`];
//! storage failures are logged in full and reported with a generic message.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info};

use hearth_core::db::Database;
use hearth_core::{Error as CoreError, FieldError, HouseholdConfig, TransactionType};

mod handlers;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Maximum accepted JSON body (64 KB)
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Header naming the household member making a request (for audit logging)
const USER_HEADER: &str = "x-hearth-user";

/// Environment variable holding comma-separated CORS origins
pub const ALLOWED_ORIGINS_ENV: &str = "HEARTH_ALLOWED_ORIGINS";

/// Server configuration
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// Read allowed origins from `HEARTH_ALLOWED_ORIGINS`
    pub fn from_env() -> Self {
        let allowed_origins = std::env::var(ALLOWED_ORIGINS_ENV)
            .map(|v| parse_origins(&v))
            .unwrap_or_default();
        Self { allowed_origins }
    }
}

/// Split a comma-separated origin list, dropping blanks
pub fn parse_origins(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub household: HouseholdConfig,
    pub config: ServerConfig,
}

/// Extract the requester from headers (for audit logging)
///
/// Returns the `x-hearth-user` value, or "local-dev" when absent.
pub fn get_user_email(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| "local-dev".to_string())
}

/// Parse a `:domain` path segment; unknown domains are 404
pub fn parse_domain(domain: &str) -> Result<TransactionType, AppError> {
    domain
        .parse()
        .map_err(|_| AppError::not_found(&format!("Unknown transaction domain '{}'", domain)))
}

/// Read and decode a JSON request body
pub async fn read_json<T: DeserializeOwned>(request: Request) -> Result<T, AppError> {
    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::bad_request(&format!("Invalid JSON: {}", e)))
}

/// Response envelope shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
        })
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        })
    }
}

/// Handler result carrying the envelope
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

/// Create the application router
pub fn create_router(
    db: Database,
    household: HouseholdConfig,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> Router {
    let state = Arc::new(AppState {
        db,
        household,
        config: config.clone(),
    });

    let api_routes = Router::new()
        // Reference data
        .route("/initial-data", get(handlers::get_initial_data))
        .route("/split-types", get(handlers::list_split_types))
        .route("/transaction-types", get(handlers::list_transaction_types))
        // Users
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/users/:id/deactivate", post(handlers::deactivate_user))
        // Allocation payments
        .route(
            "/allocations/:id/payment",
            patch(handlers::update_allocation_payment),
        )
        // Audit
        .route("/split-audit", get(handlers::list_split_audit))
        .route("/audit", get(handlers::list_audit_log))
        // Per-domain categories
        .route(
            "/:domain/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        // Per-domain transactions
        .route(
            "/:domain/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route(
            "/:domain/transactions/bulk-mark",
            post(handlers::bulk_mark_transactions),
        )
        .route(
            "/:domain/transactions/split",
            post(handlers::split_transaction),
        )
        .route(
            "/:domain/transactions/:id",
            get(handlers::get_transaction).put(handlers::update_transaction),
        )
        // Allocation splits
        .route(
            "/:domain/transactions/:id/allocations",
            get(handlers::get_allocations)
                .post(handlers::create_allocations)
                .put(handlers::update_allocations)
                .delete(handlers::delete_allocations),
        )
        // Balances
        .route("/:domain/balances", get(handlers::list_balances));

    // Build CORS layer
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let user_header = header::HeaderName::from_static(USER_HEADER);
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, user_header])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, user_header])
    };

    let csp_value = HeaderValue::from_static(
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data:; connect-src 'self'; frame-ancestors 'none'",
    );

    let mut app = Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            csp_value,
        ));

    // Serve static files if directory provided
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    household: HouseholdConfig,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if config.allowed_origins.is_empty() {
        info!("CORS restricted to same-origin (set {} to allow others)", ALLOWED_ORIGINS_ENV);
    }

    let app = create_router(db, household, static_dir, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Start the server with configuration from the environment
pub async fn serve(
    db: Database,
    household: HouseholdConfig,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
) -> anyhow::Result<()> {
    serve_with_config(db, household, host, port, static_dir, ServerConfig::from_env()).await
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    errors: Vec<FieldError>,
    internal: Option<anyhow::Error>,
}

impl AppError {
    fn new(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
            errors: Vec::new(),
            internal: None,
        }
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            errors: Vec::new(),
            // Keep full error for logging
            internal: Some(err),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// Error body of the response envelope
#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<FieldError>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(ErrorBody {
            success: false,
            error: self.message,
            errors: self.errors,
        });

        (self.status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::Validation(_)
            | CoreError::MissingSplitField { .. }
            | CoreError::UnsupportedSplitType(_)
            | CoreError::Reconciliation { .. }
            | CoreError::InvalidData(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) | CoreError::CategoryNotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            _ => return Self::internal(err.into()),
        };
        Self {
            status,
            message: err.to_string(),
            errors: err.field_errors().to_vec(),
            internal: None,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(err.into())
    }
}
