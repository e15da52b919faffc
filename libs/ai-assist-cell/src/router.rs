// libs/ai-assist-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::post,
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn ai_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/language/detect", post(handlers::detect_language))
        .route("/triage", post(handlers::triage))
        .route("/chat", post(handlers::chat))
        .route("/translate", post(handlers::translate))
        .route("/transcription/codes", post(handlers::suggest_transcription_codes))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
