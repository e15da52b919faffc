// libs/payment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn payment_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new()
        .route("/webhook", post(handlers::handle_webhook));

    let protected_routes = Router::new()
        .route("/orders", post(handlers::create_order))
        .route("/verify", post(handlers::verify_payment))
        .route("/{payment_id}", get(handlers::get_payment))
        .route("/{payment_id}/refund", post(handlers::refund_payment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
