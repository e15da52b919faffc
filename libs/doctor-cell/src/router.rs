// libs/doctor-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put, patch},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new()
        .route("/search", get(handlers::search_doctors))
        .route("/{doctor_id}", get(handlers::get_doctor))
        .route("/{doctor_id}/availability", get(handlers::get_doctor_availability))
        .route("/{doctor_id}/available-slots", get(handlers::get_available_slots));

    let protected_routes = Router::new()
        .route("/", post(handlers::create_doctor))
        .route("/me", get(handlers::get_my_doctor_profile))
        .route("/{doctor_id}", put(handlers::update_doctor))
        .route("/{doctor_id}/verify", patch(handlers::verify_doctor))
        .route("/{doctor_id}/availability", post(handlers::create_availability))
        .route(
            "/{doctor_id}/availability/{availability_id}",
            put(handlers::update_availability).delete(handlers::delete_availability),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
