// libs/medical-records-cell/src/router.rs
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::records::MAX_ATTACHMENT_BODY_BYTES;

pub fn medical_records_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_record))
        .route("/patient/{patient_id}", get(handlers::list_patient_records))
        .route(
            "/{record_id}",
            get(handlers::get_record)
                .put(handlers::update_record)
                .delete(handlers::delete_record),
        )
        .route(
            "/{record_id}/attachments",
            post(handlers::add_attachment).layer(DefaultBodyLimit::max(MAX_ATTACHMENT_BODY_BYTES)),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
