// libs/ai-assist-cell/src/handlers.rs
use std::sync::Arc;
use axum::{
    extract::{State, Extension},
    Json,
};
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;
use shared_utils::extractor::require_any_role;

use crate::models::{ChatRequest, DetectLanguageRequest, TranscriptionCodesRequest, TranslateRequest, TriageRequest};
use crate::services::AiAssistService;

#[axum::debug_handler]
pub async fn detect_language(
    State(config): State<Arc<AppConfig>>,
    Extension(_user): Extension<User>,
    Json(request): Json<DetectLanguageRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AiAssistService::new(&config);

    let detection = service.detect_language(&request.text);

    Ok(Json(json!(detection)))
}

#[axum::debug_handler]
pub async fn triage(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(request): Json<TriageRequest>,
) -> Result<Json<Value>, AppError> {
    debug!("Triage requested by user {}", user.id);
    let service = AiAssistService::new(&config);

    let assessment = service.triage(request).await?;

    Ok(Json(json!(assessment)))
}

#[axum::debug_handler]
pub async fn chat(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, AppError> {
    debug!("Chat message from user {}", user.id);
    let service = AiAssistService::new(&config);

    let reply = service.chat(request).await?;

    Ok(Json(json!(reply)))
}

#[axum::debug_handler]
pub async fn translate(
    State(config): State<Arc<AppConfig>>,
    Extension(_user): Extension<User>,
    Json(request): Json<TranslateRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AiAssistService::new(&config);

    let translation = service.translate(request).await?;

    Ok(Json(json!(translation)))
}

#[axum::debug_handler]
pub async fn suggest_transcription_codes(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(request): Json<TranscriptionCodesRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[UserRole::Doctor, UserRole::Admin])?;
    let service = AiAssistService::new(&config);

    let suggestions = service.suggest_codes(request).await?;

    Ok(Json(json!(suggestions)))
}
