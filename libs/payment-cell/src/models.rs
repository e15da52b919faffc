// libs/payment-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use shared_models::error::AppError;

// ==============================================================================
// STORED PAYMENTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub razorpay_order_id: String,
    pub razorpay_payment_id: Option<String>,
    pub amount_paise: i64,
    /// Running total of refunds; the payment turns Refunded when it reaches `amount_paise`.
    #[serde(default)]
    pub refunded_amount_paise: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn refundable_paise(&self) -> i64 {
        (self.amount_paise - self.refunded_amount_paise).max(0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Captured,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Created => write!(f, "created"),
            PaymentStatus::Captured => write!(f, "captured"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

// ==============================================================================
// API DTOS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub appointment_id: Uuid,
}

/// What the client needs to open Razorpay Checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutOrder {
    pub payment_id: Uuid,
    pub order_id: String,
    pub amount_paise: i64,
    pub currency: String,
    pub key_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Partial refund amount; the full amount when absent.
    pub amount_paise: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookOutcome {
    pub event: String,
    pub handled: bool,
}

// ==============================================================================
// RAZORPAY WIRE TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RazorpayOrderRequest {
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
    pub status: String,
}

/// Webhook envelope; only the entities the handlers read are typed.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<EntityWrapper<WebhookPaymentEntity>>,
    pub refund: Option<EntityWrapper<WebhookRefundEntity>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityWrapper<T> {
    pub entity: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPaymentEntity {
    pub id: String,
    pub order_id: Option<String>,
    pub status: Option<String>,
    pub error_description: Option<String>,
    /// Cumulative refunded amount, sent with refund events.
    pub amount_refunded: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookRefundEntity {
    pub id: String,
    pub payment_id: String,
    pub amount: Option<i64>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment not found")]
    NotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Appointment is already paid")]
    AlreadyPaid,

    #[error("Appointment cannot be paid: {0}")]
    NotPayable(String),

    #[error("Payment signature verification failed")]
    InvalidSignature,

    #[error("Only captured payments can be refunded (payment is {0})")]
    NotRefundable(PaymentStatus),

    #[error("Not authorized to access this payment")]
    Unauthorized,

    #[error("Payments are not configured")]
    NotConfigured,

    #[error("Payment gateway error: {0}")]
    GatewayError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for PaymentError {
    fn from(err: anyhow::Error) -> Self {
        PaymentError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::DatabaseError(err.to_string())
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::GatewayError(err.to_string())
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotFound | PaymentError::AppointmentNotFound => AppError::NotFound(err.to_string()),
            PaymentError::AlreadyPaid => AppError::Conflict(err.to_string()),
            PaymentError::NotPayable(_)
            | PaymentError::InvalidSignature
            | PaymentError::NotRefundable(_) => AppError::BadRequest(err.to_string()),
            PaymentError::Unauthorized => AppError::Forbidden(err.to_string()),
            PaymentError::NotConfigured => AppError::Unavailable(err.to_string()),
            PaymentError::GatewayError(msg) => AppError::ExternalService(msg),
            PaymentError::ValidationError(msg) => AppError::ValidationError(msg),
            PaymentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
