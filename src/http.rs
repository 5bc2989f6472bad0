//! HTTP request surface.
//!
//! A thin `axum` router translating the four license endpoints onto the
//! lifecycle engine and mapping results onto responses. The one contract
//! the engine requires of this layer: `NotFound` maps to 404 with a
//! descriptive message, distinctly from generic errors, which map to 500
//! with the error's text.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::manager::LeaseManager;
use crate::record::License;
use crate::LeasepoolError;

/// Build the license router over a shared engine.
pub fn router(manager: Arc<LeaseManager>) -> Router {
    Router::new()
        .route("/license/claim", post(claim))
        .route("/license/fetchall", get(fetch_all))
        .route("/license/user/getLicense", get(get_license))
        .route("/license/user/freeLicense", post(free_license))
        .with_state(manager)
}

#[derive(Debug, Deserialize)]
struct AccountQuery {
    #[serde(rename = "appID", default)]
    app_id: String,
    #[serde(rename = "accountID", default)]
    account_id: String,
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    #[serde(rename = "appID", default)]
    app_id: String,
    #[serde(rename = "accountID", default)]
    account_id: String,
    #[serde(rename = "userID", default)]
    user_id: String,
}

async fn claim(
    State(manager): State<Arc<LeaseManager>>,
    Json(license): Json<License>,
) -> Response {
    match manager.create_reservation(&license).await {
        Ok(reservation) => (
            StatusCode::ACCEPTED,
            Json(json!({ "reservation": reservation })),
        )
            .into_response(),
        Err(err @ LeasepoolError::InvalidRecord(_)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
        Err(err) => internal_error(err),
    }
}

async fn fetch_all(
    State(manager): State<Arc<LeaseManager>>,
    Query(q): Query<AccountQuery>,
) -> Response {
    match manager
        .fetch_account_reservations(&q.account_id, &q.app_id)
        .await
    {
        Ok(reserved) => (StatusCode::OK, Json(json!({ "licenses": reserved }))).into_response(),
        Err(LeasepoolError::NotFound) => not_found(format!(
            "No records found for {}{}",
            q.account_id, q.app_id
        )),
        Err(err) => internal_error(err),
    }
}

async fn get_license(
    State(manager): State<Arc<LeaseManager>>,
    Query(q): Query<UserQuery>,
) -> Response {
    match manager
        .fetch_user_reservation(&q.user_id, &q.app_id, &q.account_id)
        .await
    {
        // Renewed and reissued leases look the same to today's clients.
        Ok(grant) => (
            StatusCode::OK,
            Json(json!({ "license": grant.into_license() })),
        )
            .into_response(),
        Err(LeasepoolError::NotFound) => not_found(format!(
            "No records found for {} {}",
            q.user_id, q.app_id
        )),
        Err(err) => internal_error(err),
    }
}

async fn free_license(
    State(manager): State<Arc<LeaseManager>>,
    Query(q): Query<UserQuery>,
) -> Response {
    match manager
        .return_user_license(&q.user_id, &q.app_id, &q.account_id)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "message": "License revoked successfully" })),
        )
            .into_response(),
        Err(LeasepoolError::NotFound) => not_found("No record found to revoke".to_string()),
        Err(err) => internal_error(err),
    }
}

fn not_found(message: String) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}

fn internal_error(err: LeasepoolError) -> Response {
    error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.to_string() })),
    )
        .into_response()
}
