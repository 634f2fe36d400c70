use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
    Extension, Router,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{auth_middleware, Claims, JwtHandler};
use crate::models::{BulkPortfolioResult, PortfolioView, TotalValueSummary};
use crate::portfolio::{PortfolioAggregator, PortfolioError};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PortfolioAggregator>,
}

/// Create the API router
pub fn create_router(engine: Arc<PortfolioAggregator>, jwt: Arc<JwtHandler>) -> Router {
    let state = AppState { engine };

    let protected = Router::new()
        .route("/api/portfolio", get(get_portfolio))
        .route("/api/portfolio/all", get(get_all_portfolios))
        .route("/api/portfolio/admin/total-value", get(get_total_value))
        .layer(middleware::from_fn_with_state(jwt, auth_middleware))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
}

// ===== Route Handlers =====

async fn health_check() -> &'static str {
    "ok"
}

/// Own portfolio for standard accounts, every portfolio for operators
async fn get_portfolio(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<PortfolioView>, ApiError> {
    let account_id = caller_id(&claims)?;
    Ok(Json(state.engine.view(&account_id).await?))
}

async fn get_all_portfolios(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<BulkPortfolioResult>, ApiError> {
    let account_id = caller_id(&claims)?;
    Ok(Json(state.engine.value_all(&account_id).await?))
}

async fn get_total_value(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<TotalValueSummary>, ApiError> {
    let account_id = caller_id(&claims)?;
    Ok(Json(state.engine.total_value(&account_id).await?))
}

fn caller_id(claims: &Claims) -> Result<Uuid, ApiError> {
    claims.account_id().ok_or(ApiError::Unauthorized)
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    Portfolio(PortfolioError),
    /// Token is valid but its subject is not an account id
    Unauthorized,
}

impl From<PortfolioError> for ApiError {
    fn from(err: PortfolioError) -> Self {
        ApiError::Portfolio(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Portfolio(PortfolioError::AccountNotFound(_)) => {
                (StatusCode::NOT_FOUND, "Account not found".to_string())
            }
            ApiError::Portfolio(PortfolioError::Forbidden) => {
                (StatusCode::FORBIDDEN, "Operator role required".to_string())
            }
            ApiError::Portfolio(PortfolioError::Store(err)) => {
                tracing::error!("Account store error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Invalid token subject".to_string()),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
