// libs/video-conferencing-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State, Extension},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AddTracksRequest, CreateVideoSessionRequest, JoinSessionRequest, RenegotiateRequest};
use crate::services::cloudflare::default_ice_servers;
use crate::services::{CloudflareRealtimeClient, VideoSessionService};

#[axum::debug_handler]
pub async fn create_video_session(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateVideoSessionRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = VideoSessionService::new(&config)?;

    let (session, created) = service.create_session(&user, request, auth.token()).await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(json!({
        "success": true,
        "session": session,
        "created": created
    }))))
}

#[axum::debug_handler]
pub async fn get_video_session(
    State(config): State<Arc<AppConfig>>,
    Path(session_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = VideoSessionService::new(&config)?;

    let session = service.get_session(&user, session_id, auth.token()).await?;

    Ok(Json(json!(session)))
}

#[axum::debug_handler]
pub async fn get_appointment_session(
    State(config): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = VideoSessionService::new(&config)?;

    let session = service.get_session_for_appointment(&user, appointment_id, auth.token()).await?;

    Ok(Json(json!(session)))
}

#[axum::debug_handler]
pub async fn join_video_session(
    State(config): State<Arc<AppConfig>>,
    Path(session_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<JoinSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let service = VideoSessionService::new(&config)?;

    let response = service.join_session(&user, session_id, request, auth.token()).await?;

    Ok(Json(json!(response)))
}

#[axum::debug_handler]
pub async fn add_session_tracks(
    State(config): State<Arc<AppConfig>>,
    Path(session_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<AddTracksRequest>,
) -> Result<Json<Value>, AppError> {
    let service = VideoSessionService::new(&config)?;

    let response = service.add_tracks(&user, session_id, request, auth.token()).await?;

    Ok(Json(json!(response)))
}

#[axum::debug_handler]
pub async fn renegotiate_session(
    State(config): State<Arc<AppConfig>>,
    Path(session_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RenegotiateRequest>,
) -> Result<StatusCode, AppError> {
    let service = VideoSessionService::new(&config)?;

    service.renegotiate_session(&user, session_id, request.answer_sdp, auth.token()).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn end_video_session(
    State(config): State<Arc<AppConfig>>,
    Path(session_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = VideoSessionService::new(&config)?;

    let session = service.end_session(&user, session_id, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "session": session,
        "message": "Video session ended"
    })))
}

/// Public. Reports configuration and whether the Cloudflare API answers.
#[axum::debug_handler]
pub async fn video_health_check(
    State(config): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let client = match CloudflareRealtimeClient::new(&config) {
        Ok(client) => client,
        Err(_) => {
            return Ok(Json(json!({
                "status": "not_configured",
                "video_configured": false,
                "ice_servers": default_ice_servers()
            })));
        }
    };

    let cloudflare_healthy = client.health_check().await.unwrap_or(false);

    Ok(Json(json!({
        "status": if cloudflare_healthy { "healthy" } else { "unhealthy" },
        "video_configured": true,
        "cloudflare_status": if cloudflare_healthy { "connected" } else { "error" },
        "ice_servers": client.get_ice_servers()
    })))
}
