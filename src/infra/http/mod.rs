//! HTTP surface: account reads with caching headers, admin mutations, health.

mod error;
mod handlers;
mod middleware;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, codes};
pub use handlers::CACHE_STATUS_HEADER;
pub use middleware::{REQUEST_ID_HEADER, RequestContext};

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post},
};

use crate::application::accounts::AccountService;

#[derive(Clone)]
pub struct HttpState {
    pub accounts: AccountService,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route(
            "/api/accounts/{account_id}/dashboard",
            get(handlers::dashboard),
        )
        .route("/api/accounts/{account_id}/inboxes", get(handlers::inboxes))
        .route("/api/accounts/{account_id}/domains", get(handlers::domains))
        .route(
            "/admin/accounts/{account_id}/inboxes/{inbox_id}",
            patch(handlers::update_inbox),
        )
        .route(
            "/admin/accounts/{account_id}/domains/{domain_id}",
            patch(handlers::update_domain),
        )
        .route(
            "/admin/accounts/{account_id}/orders/{order_id}/fulfill",
            post(handlers::fulfill_order),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
