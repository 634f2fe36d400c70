//! HTTP surface: auth gate, role checks, status mapping

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{harness, ScriptedOracle, ScriptedProvider};
use ledgerlens_backend::api::create_router;
use ledgerlens_backend::auth::JwtHandler;
use ledgerlens_backend::models::{Account, AccountRole, Chain};
use rust_decimal_macros::dec;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "route-test-secret";

struct App {
    router: Router,
    jwt: JwtHandler,
    operator: Account,
    user: Account,
}

fn app() -> App {
    let operator = Account::new("ops", AccountRole::Operator);
    let user = Account::new("alice", AccountRole::Standard)
        .with_email("alice@example.com")
        .with_address(Chain::Stellar, "GALICE");

    let h = harness(
        vec![operator.clone(), user.clone()],
        vec![Arc::new(
            ScriptedProvider::new(Chain::Stellar).with_balance("GALICE", dec!(1500)),
        )],
        ScriptedOracle::with_prices(&[("stellar", dec!(0.10))]),
    );

    App {
        router: create_router(Arc::new(h.engine), Arc::new(JwtHandler::new(SECRET.to_string()))),
        jwt: JwtHandler::new(SECRET.to_string()),
        operator,
        user,
    }
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_needs_no_token() {
    let app = app();
    let response = app.router.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn portfolio_requires_bearer_token() {
    let app = app();

    let response = app.router.clone().oneshot(get("/api/portfolio", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .router
        .oneshot(get("/api/portfolio", Some("not-a-jwt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn standard_account_sees_own_portfolio() {
    let app = app();
    let (token, _) = app.jwt.generate_token(&app.user).unwrap();

    let response = app.router.oneshot(get("/api/portfolio", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["isOperator"], false);
    assert_eq!(body["portfolio"]["totalValue"], serde_json::json!(150.0));
    assert_eq!(body["portfolio"]["assets"][0]["symbol"], "XLM");
    assert!(body.get("portfolios").is_none());
}

#[tokio::test]
async fn bulk_routes_are_operator_only() {
    let app = app();
    let (user_token, _) = app.jwt.generate_token(&app.user).unwrap();
    let (operator_token, _) = app.jwt.generate_token(&app.operator).unwrap();

    for uri in ["/api/portfolio/all", "/api/portfolio/admin/total-value"] {
        let response = app.router.clone().oneshot(get(uri, Some(&user_token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
    }

    let response = app
        .router
        .clone()
        .oneshot(get("/api/portfolio/all", Some(&operator_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["username"], "alice");
    assert_eq!(body[0]["email"], "alice@example.com");

    let response = app
        .router
        .oneshot(get("/api/portfolio/admin/total-value", Some(&operator_token)))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["accountCount"], 1);
    assert_eq!(body["totalPortfolioValue"], serde_json::json!(150.0));
}

#[tokio::test]
async fn token_for_deleted_account_is_not_found() {
    let app = app();
    let ghost = Account::new("ghost", AccountRole::Standard);
    let (token, _) = app.jwt.generate_token(&ghost).unwrap();

    let response = app.router.oneshot(get("/api/portfolio", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "Account not found");
}
