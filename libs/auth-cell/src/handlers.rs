// libs/auth-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Json, State},
    http::HeaderMap,
};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{TokenResponse, User, UserRole};
use shared_models::error::AppError;
use shared_utils::jwt::{self, extract_bearer_token};

use crate::models::{ForgotPasswordRequest, PasswordStrengthRequest, PasswordStrengthResult, ResetPasswordRequest};
use crate::services::{PasswordResetService, PasswordSecurityService};

pub async fn validate_token(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let token = extract_bearer_token(&headers)?;
    let user = jwt::validate_token(&token, &config.supabase_jwt_secret)
        .map_err(AppError::Auth)?;

    let role = user.app_role().map(|r| r.to_string()).or(user.role);

    Ok(Json(TokenResponse {
        valid: true,
        user_id: user.id,
        email: user.email,
        role,
    }))
}

pub async fn verify_token(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    debug!("Verifying token");

    let token = extract_bearer_token(&headers)?;
    let valid = jwt::validate_token(&token, &config.supabase_jwt_secret).is_ok();

    Ok(Json(json!({ "valid": valid })))
}

pub async fn get_profile(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    debug!("Getting profile for user: {}", user.id);

    let token = extract_bearer_token(&headers)?;
    let client = SupabaseClient::new(&config);

    let auth_profile = client.get_user_profile(&token)
        .await
        .map_err(|e| AppError::ExternalService(e.to_string()))?;

    let table = match user.app_role() {
        Some(UserRole::Doctor) => Some("doctors"),
        Some(UserRole::Patient) => Some("patients"),
        _ => None,
    };

    let domain_profile = match table {
        Some(table) => {
            let rows: Vec<Value> = client
                .request(
                    Method::GET,
                    &format!("/rest/v1/{}?user_id=eq.{}", table, user.id),
                    Some(&token),
                    None,
                )
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            rows.into_iter().next()
        }
        None => None,
    };

    Ok(Json(json!({
        "user_id": user.id,
        "role": user.app_role(),
        "auth_profile": auth_profile,
        "profile": domain_profile,
    })))
}

pub async fn forgot_password(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    let service = PasswordResetService::new(&config);
    service.request_reset(&request.email).await?;

    Ok(Json(json!({
        "success": true,
        "message": "If an account exists for this email, a reset code has been sent"
    })))
}

pub async fn reset_password(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    let service = PasswordResetService::new(&config);
    service
        .reset_password(&request.email, &request.code, &request.new_password)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Password has been reset"
    })))
}

pub async fn check_password_strength(
    Json(request): Json<PasswordStrengthRequest>,
) -> Json<PasswordStrengthResult> {
    Json(PasswordSecurityService::validate_password_strength(&request.password))
}
