// libs/payment-cell/src/handlers.rs
use std::sync::Arc;
use axum::{
    body::Bytes,
    extract::{Path, State, Extension},
    http::{HeaderMap, StatusCode},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateOrderRequest, RefundRequest, VerifyPaymentRequest};
use crate::services::PaymentService;

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[axum::debug_handler]
pub async fn create_order(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = PaymentService::new(&config);

    let order = service.create_order(&user, request, auth.token()).await?;

    Ok((StatusCode::CREATED, Json(json!(order))))
}

#[axum::debug_handler]
pub async fn verify_payment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = PaymentService::new(&config);

    let payment = service.verify_payment(&user, request, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "payment": payment
    })))
}

/// Razorpay calls this without a user session; the HMAC signature over the
/// raw body is the only credential.
#[axum::debug_handler]
pub async fn handle_webhook(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing webhook signature".to_string()))?;

    let service = PaymentService::new(&config);
    let outcome = service.handle_webhook(&body, signature).await?;

    Ok(Json(json!({
        "status": "ok",
        "event": outcome.event,
        "handled": outcome.handled
    })))
}

#[axum::debug_handler]
pub async fn get_payment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = PaymentService::new(&config);

    let payment = service.get_payment(&user, payment_id, auth.token()).await?;

    Ok(Json(json!(payment)))
}

#[axum::debug_handler]
pub async fn refund_payment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<Value>, AppError> {
    let service = PaymentService::new(&config);

    let payment = service.refund_payment(&user, payment_id, request, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "payment": payment
    })))
}
