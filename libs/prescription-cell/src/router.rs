// libs/prescription-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn prescription_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_prescription))
        .route("/patient/{patient_id}", get(handlers::list_patient_prescriptions))
        .route("/{prescription_id}", get(handlers::get_prescription))
        .route("/{prescription_id}/cancel", post(handlers::cancel_prescription))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
