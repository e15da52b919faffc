// libs/prescription-cell/src/handlers.rs
use std::sync::Arc;
use axum::{
    extract::{Path, Query, State, Extension},
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

use crate::models::{CancelPrescriptionRequest, CreatePrescriptionRequest, PrescriptionListQuery};
use crate::services::PrescriptionService;

#[axum::debug_handler]
pub async fn create_prescription(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePrescriptionRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = PrescriptionService::new(&config);

    let prescription = service.create_prescription(&user, request, auth.token()).await?;

    Ok((StatusCode::CREATED, Json(json!(prescription))))
}

#[axum::debug_handler]
pub async fn get_prescription(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(prescription_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = PrescriptionService::new(&config);

    let prescription = service.get_prescription(&user, prescription_id, auth.token()).await?;

    Ok(Json(json!(prescription)))
}

#[axum::debug_handler]
pub async fn list_patient_prescriptions(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
    Query(query): Query<PrescriptionListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = PrescriptionService::new(&config);

    let prescriptions = service
        .list_patient_prescriptions(&user, patient_id, query, auth.token())
        .await?;

    Ok(Json(json!({
        "patient_id": patient_id,
        "total": prescriptions.len(),
        "prescriptions": prescriptions,
    })))
}

#[axum::debug_handler]
pub async fn cancel_prescription(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(prescription_id): Path<Uuid>,
    Json(request): Json<CancelPrescriptionRequest>,
) -> Result<Json<Value>, AppError> {
    let service = PrescriptionService::new(&config);

    let prescription = service
        .cancel_prescription(&user, prescription_id, request, auth.token())
        .await?;

    Ok(Json(json!(prescription)))
}
