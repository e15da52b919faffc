// libs/video-conferencing-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put, delete},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::*;

pub fn video_conferencing_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(video_health_check));

    let protected_routes = Router::new()
        .route("/sessions", post(create_video_session))
        .route("/sessions/{session_id}", get(get_video_session))
        .route("/sessions/{session_id}/join", post(join_video_session))
        .route("/sessions/{session_id}/tracks", post(add_session_tracks))
        .route("/sessions/{session_id}/renegotiate", put(renegotiate_session))
        .route("/sessions/{session_id}/end", delete(end_video_session))
        .route("/appointments/{appointment_id}/session", get(get_appointment_session))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
