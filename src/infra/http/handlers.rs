//! Account dashboard and admin mutation handlers.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::repos::{DomainUpdate, InboxUpdate};
use crate::cache::{CacheRead, Namespace, conditional::cached_json_response};
use crate::domain::accounts::AccountId;
use crate::domain::types::ProvisioningStatus;
use crate::infra::error::InfraError;

use super::HttpState;
use super::error::{ApiError, account_to_api};

pub const CACHE_STATUS_HEADER: &str = "x-cache";

#[derive(Debug, Deserialize)]
pub struct InboxPatch {
    pub display_name: Option<String>,
    pub status: Option<ProvisioningStatus>,
}

#[derive(Debug, Deserialize)]
pub struct DomainPatch {
    pub forwarding_url: Option<String>,
    pub status: Option<ProvisioningStatus>,
}

pub async fn dashboard(
    State(state): State<HttpState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let account = parse_account(&account_id)?;
    let read = state
        .accounts
        .dashboard(&account)
        .await
        .map_err(account_to_api)?;
    Ok(cached_response(&state, &read, &headers, Namespace::Dashboard))
}

pub async fn inboxes(
    State(state): State<HttpState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let account = parse_account(&account_id)?;
    let read = state
        .accounts
        .inboxes(&account)
        .await
        .map_err(account_to_api)?;
    Ok(cached_response(&state, &read, &headers, Namespace::Inboxes))
}

pub async fn domains(
    State(state): State<HttpState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let account = parse_account(&account_id)?;
    let read = state
        .accounts
        .domains(&account)
        .await
        .map_err(account_to_api)?;
    Ok(cached_response(&state, &read, &headers, Namespace::Domains))
}

pub async fn update_inbox(
    State(state): State<HttpState>,
    Path((account_id, inbox_id)): Path<(String, String)>,
    payload: Result<Json<InboxPatch>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let account = parse_account(&account_id)?;
    let inbox_id = parse_id("inbox id", &inbox_id)?;
    let Json(patch) = payload.map_err(json_to_api)?;

    let update = InboxUpdate {
        display_name: patch.display_name,
        status: patch.status,
    };
    let record = state
        .accounts
        .update_inbox(&account, inbox_id, update)
        .await
        .map_err(account_to_api)?;
    Ok(Json(record))
}

pub async fn update_domain(
    State(state): State<HttpState>,
    Path((account_id, domain_id)): Path<(String, String)>,
    payload: Result<Json<DomainPatch>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let account = parse_account(&account_id)?;
    let domain_id = parse_id("domain id", &domain_id)?;
    let Json(patch) = payload.map_err(json_to_api)?;

    let update = DomainUpdate {
        forwarding_url: patch.forwarding_url,
        status: patch.status,
    };
    let record = state
        .accounts
        .update_domain(&account, domain_id, update)
        .await
        .map_err(account_to_api)?;
    Ok(Json(record))
}

pub async fn fulfill_order(
    State(state): State<HttpState>,
    Path((account_id, order_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let account = parse_account(&account_id)?;
    let order_id = parse_id("order id", &order_id)?;
    let fulfilled = state
        .accounts
        .fulfill_order(&account, order_id)
        .await
        .map_err(account_to_api)?;
    Ok(Json(fulfilled))
}

pub async fn health(State(state): State<HttpState>) -> Result<StatusCode, AppError> {
    state
        .accounts
        .health()
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|err| InfraError::database(err.to_string()).into())
}

fn cached_response<T: Serialize>(
    state: &HttpState,
    read: &CacheRead<T>,
    headers: &HeaderMap,
    namespace: Namespace,
) -> Response {
    let config = state.accounts.cache_config();
    let mut response = cached_json_response(
        read,
        headers,
        config.ttl_for(namespace),
        config.freshness_window(),
    );
    let status = if read.is_hit() { "HIT" } else { "MISS" };
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static(status));
    response
}

fn parse_account(raw: &str) -> Result<AccountId, ApiError> {
    AccountId::parse(raw)
        .map_err(|err| ApiError::bad_request("invalid account id", Some(err.to_string())))
}

fn parse_id(label: &'static str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|err| ApiError::bad_request("invalid identifier", Some(format!("{label}: {err}"))))
}

fn json_to_api(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request("invalid request body", Some(rejection.body_text()))
}
