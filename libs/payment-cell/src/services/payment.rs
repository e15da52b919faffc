// libs/payment-cell/src/services/payment.rs
use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use auth_cell::AccessControlService;
use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    CheckoutOrder, CreateOrderRequest, Payment, PaymentError, PaymentStatus, RazorpayOrderRequest,
    RefundRequest, VerifyPaymentRequest, WebhookEvent, WebhookOutcome,
};
use crate::services::razorpay::RazorpayClient;
use crate::services::signature;

pub const CURRENCY: &str = "INR";

/// Appointment statuses that still accept payment.
const PAYABLE_STATUSES: [&str; 3] = ["pending", "confirmed", "rescheduled"];

#[derive(Debug, Deserialize)]
struct AppointmentRef {
    id: Uuid,
    patient_id: Uuid,
    doctor_id: Uuid,
    status: String,
    payment_status: String,
}

/// Rupees to paise, rounded to the nearest paisa.
pub fn fee_to_paise(fee: f64) -> i64 {
    (fee * 100.0).round() as i64
}

pub struct PaymentService {
    supabase: SupabaseClient,
    access: AccessControlService,
    key_secret: String,
    webhook_secret: String,
    config: AppConfig,
}

impl PaymentService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            access: AccessControlService::new(config),
            key_secret: config.razorpay_key_secret.clone(),
            webhook_secret: config.razorpay_webhook_secret.clone(),
            config: config.clone(),
        }
    }

    fn razorpay(&self) -> Result<RazorpayClient, PaymentError> {
        RazorpayClient::new(&self.config)
    }

    async fn fetch_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<AppointmentRef, PaymentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&select=id,patient_id,doctor_id,status,payment_status",
            appointment_id
        );
        let row = self.supabase.fetch_one(&path, Some(auth_token)).await?
            .ok_or(PaymentError::AppointmentNotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    async fn consultation_fee(&self, doctor_id: Uuid, auth_token: &str) -> Result<f64, PaymentError> {
        let path = format!("/rest/v1/doctors?id=eq.{}&select=consultation_fee", doctor_id);
        let row = self.supabase.fetch_one(&path, Some(auth_token)).await?
            .ok_or_else(|| PaymentError::NotPayable("doctor not found".to_string()))?;
        row["consultation_fee"]
            .as_f64()
            .ok_or_else(|| PaymentError::DatabaseError("Doctor has no consultation fee".to_string()))
    }

    async fn is_payment_owner(&self, user: &User, payment: &Payment, auth_token: &str) -> Result<bool, PaymentError> {
        if user.is_admin() {
            return Ok(true);
        }
        let own = self.access.patient_id_for_user(&user.id, auth_token).await?;
        Ok(own.as_deref() == Some(payment.patient_id.to_string().as_str()))
    }

    /// Creates (or reuses) the Razorpay order for an appointment.
    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn create_order(
        &self,
        user: &User,
        request: CreateOrderRequest,
        auth_token: &str,
    ) -> Result<CheckoutOrder, PaymentError> {
        let razorpay = self.razorpay()?;

        let appointment = self.fetch_appointment(request.appointment_id, auth_token).await?;
        let own = self.access.patient_id_for_user(&user.id, auth_token).await?;
        if own.as_deref() != Some(appointment.patient_id.to_string().as_str()) {
            return Err(PaymentError::Unauthorized);
        }
        if appointment.payment_status == "paid" {
            return Err(PaymentError::AlreadyPaid);
        }
        if !PAYABLE_STATUSES.contains(&appointment.status.as_str()) {
            return Err(PaymentError::NotPayable(format!("appointment is {}", appointment.status)));
        }

        // A retried checkout reuses the open order.
        let open_path = format!(
            "/rest/v1/payments?appointment_id=eq.{}&status=eq.created&order=created_at.desc&limit=1",
            appointment.id
        );
        if let Some(row) = self.supabase.fetch_one(&open_path, Some(auth_token)).await? {
            let payment: Payment = serde_json::from_value(row)?;
            debug!("Reusing open order {} for appointment {}", payment.razorpay_order_id, appointment.id);
            return Ok(CheckoutOrder {
                payment_id: payment.id,
                order_id: payment.razorpay_order_id,
                amount_paise: payment.amount_paise,
                currency: payment.currency,
                key_id: razorpay.key_id().to_string(),
            });
        }

        let amount_paise = fee_to_paise(self.consultation_fee(appointment.doctor_id, auth_token).await?);
        if amount_paise <= 0 {
            return Err(PaymentError::NotPayable("consultation is free".to_string()));
        }

        let order = razorpay.create_order(&RazorpayOrderRequest {
            amount: amount_paise,
            currency: CURRENCY.to_string(),
            receipt: appointment.id.to_string(),
            notes: json!({
                "appointment_id": appointment.id,
                "patient_id": appointment.patient_id
            }),
        }).await?;

        let now = Utc::now().to_rfc3339();
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/payments",
            Some(auth_token),
            Some(json!({
                "appointment_id": appointment.id,
                "patient_id": appointment.patient_id,
                "razorpay_order_id": order.id,
                "razorpay_payment_id": null,
                "amount_paise": order.amount,
                "refunded_amount_paise": 0,
                "currency": order.currency,
                "status": PaymentStatus::Created,
                "failure_reason": null,
                "created_at": now,
                "updated_at": now
            })),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| PaymentError::DatabaseError("Failed to store payment".to_string()))?;
        let payment: Payment = serde_json::from_value(row)?;

        info!("Payment {} created with order {}", payment.id, payment.razorpay_order_id);
        Ok(CheckoutOrder {
            payment_id: payment.id,
            order_id: payment.razorpay_order_id,
            amount_paise: payment.amount_paise,
            currency: payment.currency,
            key_id: razorpay.key_id().to_string(),
        })
    }

    /// Checks the Checkout callback signature and captures the payment.
    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id, order_id = %request.razorpay_order_id))]
    pub async fn verify_payment(
        &self,
        user: &User,
        request: VerifyPaymentRequest,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        let payment = self.find_by_order_id(&request.razorpay_order_id).await?
            .ok_or(PaymentError::NotFound)?;

        if !self.is_payment_owner(user, &payment, auth_token).await? {
            return Err(PaymentError::Unauthorized);
        }

        if payment.status == PaymentStatus::Captured
            && payment.razorpay_payment_id.as_deref() == Some(request.razorpay_payment_id.as_str())
        {
            return Ok(payment);
        }

        if !signature::verify_checkout_signature(
            &self.key_secret,
            &request.razorpay_order_id,
            &request.razorpay_payment_id,
            &request.razorpay_signature,
        ) {
            warn!("Checkout signature mismatch for order {}", request.razorpay_order_id);
            if payment.status == PaymentStatus::Created {
                self.mark_failed(&payment, "signature verification failed").await?;
            }
            return Err(PaymentError::InvalidSignature);
        }

        if payment.status != PaymentStatus::Created && payment.status != PaymentStatus::Failed {
            return Err(PaymentError::NotPayable(format!("payment is {}", payment.status)));
        }

        self.mark_captured(&payment, &request.razorpay_payment_id).await
    }

    /// Handles a Razorpay webhook delivery. Unknown events are acknowledged.
    #[instrument(skip(self, body, signature_header))]
    pub async fn handle_webhook(&self, body: &[u8], signature_header: &str) -> Result<WebhookOutcome, PaymentError> {
        if !signature::verify_webhook_signature(&self.webhook_secret, body, signature_header) {
            warn!("Rejected webhook with invalid signature");
            return Err(PaymentError::InvalidSignature);
        }

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| PaymentError::ValidationError(format!("Malformed webhook payload: {}", e)))?;
        info!("Received Razorpay webhook {}", event.event);

        let handled = match event.event.as_str() {
            "payment.captured" => match event.payload.payment.map(|p| p.entity) {
                Some(entity) => match self.lookup_order(entity.order_id.as_deref()).await? {
                    Some(payment) if payment.status != PaymentStatus::Captured
                        && payment.status != PaymentStatus::Refunded =>
                    {
                        self.mark_captured(&payment, &entity.id).await?;
                        true
                    }
                    Some(_) => true,
                    None => false,
                },
                None => false,
            },
            "payment.failed" => match event.payload.payment.map(|p| p.entity) {
                Some(entity) => match self.lookup_order(entity.order_id.as_deref()).await? {
                    Some(payment) if payment.status == PaymentStatus::Created => {
                        let reason = entity.error_description.unwrap_or_else(|| "payment failed".to_string());
                        self.mark_failed(&payment, &reason).await?;
                        true
                    }
                    Some(_) => true,
                    None => false,
                },
                None => false,
            },
            "refund.processed" => match event.payload.refund.map(|r| r.entity) {
                Some(refund) => match self.find_by_payment_id(&refund.payment_id).await? {
                    Some(payment) if payment.status == PaymentStatus::Captured => {
                        // Prefer Razorpay's running total so redelivered events are not counted twice.
                        let refunded_total = event.payload.payment
                            .and_then(|p| p.entity.amount_refunded)
                            .unwrap_or_else(|| {
                                payment.refunded_amount_paise
                                    + refund.amount.unwrap_or_else(|| payment.refundable_paise())
                            });
                        self.record_refund(&payment, refunded_total).await?;
                        true
                    }
                    Some(_) => true,
                    None => false,
                },
                None => false,
            },
            other => {
                debug!("Ignoring Razorpay event {}", other);
                false
            }
        };

        if !handled {
            debug!("Webhook {} acknowledged without changes", event.event);
        }
        Ok(WebhookOutcome { event: event.event, handled })
    }

    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn refund_payment(
        &self,
        user: &User,
        payment_id: Uuid,
        request: RefundRequest,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        if !user.is_admin() {
            return Err(PaymentError::Unauthorized);
        }

        let payment = self.fetch_payment(payment_id, auth_token).await?;
        if payment.status != PaymentStatus::Captured {
            return Err(PaymentError::NotRefundable(payment.status));
        }
        let razorpay_payment_id = payment.razorpay_payment_id.clone()
            .ok_or_else(|| PaymentError::DatabaseError("Captured payment has no Razorpay id".to_string()))?;

        let refundable = payment.refundable_paise();
        let amount = request.amount_paise.unwrap_or(refundable);
        if amount <= 0 || amount > refundable {
            return Err(PaymentError::ValidationError(format!(
                "Refund amount must be between 1 and {} paise",
                refundable
            )));
        }

        let refund = self.razorpay()?
            .refund_payment(&razorpay_payment_id, Some(amount))
            .await?;
        info!(
            "Refund {} ({} paise) issued for payment {}, reason: {}",
            refund.id,
            refund.amount,
            payment.id,
            request.reason.as_deref().unwrap_or("none")
        );

        self.record_refund(&payment, payment.refunded_amount_paise + refund.amount).await
    }

    pub async fn get_payment(&self, user: &User, payment_id: Uuid, auth_token: &str) -> Result<Payment, PaymentError> {
        let payment = self.fetch_payment(payment_id, auth_token).await?;
        if !self.is_payment_owner(user, &payment, auth_token).await? {
            return Err(PaymentError::Unauthorized);
        }
        Ok(payment)
    }

    // ==========================================================================
    // STATE CHANGES
    // ==========================================================================

    async fn fetch_payment(&self, payment_id: Uuid, auth_token: &str) -> Result<Payment, PaymentError> {
        let path = format!("/rest/v1/payments?id=eq.{}", payment_id);
        let row = self.supabase.fetch_one(&path, Some(auth_token)).await?
            .ok_or(PaymentError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    async fn lookup_order(&self, order_id: Option<&str>) -> Result<Option<Payment>, PaymentError> {
        match order_id {
            Some(order_id) => self.find_by_order_id(order_id).await,
            None => Ok(None),
        }
    }

    /// Webhooks carry no caller session, so lookups use the service role.
    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Payment>, PaymentError> {
        self.find_one(&format!(
            "/rest/v1/payments?razorpay_order_id=eq.{}",
            urlencoding::encode(order_id)
        )).await
    }

    async fn find_by_payment_id(&self, razorpay_payment_id: &str) -> Result<Option<Payment>, PaymentError> {
        self.find_one(&format!(
            "/rest/v1/payments?razorpay_payment_id=eq.{}",
            urlencoding::encode(razorpay_payment_id)
        )).await
    }

    async fn find_one(&self, path: &str) -> Result<Option<Payment>, PaymentError> {
        let rows: Vec<Value> = self.supabase.service_request(Method::GET, path, None).await?;
        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(PaymentError::from)
    }

    async fn update_payment(&self, payment_id: Uuid, mut body: Value) -> Result<Payment, PaymentError> {
        body["updated_at"] = json!(Utc::now().to_rfc3339());
        let rows: Vec<Value> = self.supabase.service_request(
            Method::PATCH,
            &format!("/rest/v1/payments?id=eq.{}", payment_id),
            Some(body),
        ).await?;

        let row = rows.into_iter().next().ok_or(PaymentError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    async fn mark_captured(&self, payment: &Payment, razorpay_payment_id: &str) -> Result<Payment, PaymentError> {
        let updated = self.update_payment(payment.id, json!({
            "status": PaymentStatus::Captured,
            "razorpay_payment_id": razorpay_payment_id,
            "failure_reason": null
        })).await?;

        let now = Utc::now().to_rfc3339();
        let appointment_path = format!("/rest/v1/appointments?id=eq.{}", payment.appointment_id);
        let _: Value = self.supabase.service_request(
            Method::PATCH,
            &appointment_path,
            Some(json!({ "payment_status": "paid", "updated_at": now })),
        ).await?;

        // Payment confirms a pending booking; other statuses are left alone.
        let _: Value = self.supabase.service_request(
            Method::PATCH,
            &format!("{}&status=eq.pending", appointment_path),
            Some(json!({ "status": "confirmed", "updated_at": now })),
        ).await?;

        info!("Payment {} captured for appointment {}", payment.id, payment.appointment_id);
        Ok(updated)
    }

    async fn mark_failed(&self, payment: &Payment, reason: &str) -> Result<Payment, PaymentError> {
        warn!("Payment {} failed: {}", payment.id, reason);
        self.update_payment(payment.id, json!({
            "status": PaymentStatus::Failed,
            "failure_reason": reason
        })).await
    }

    /// Stores the cumulative refund. Only a refund of the whole amount moves the
    /// payment and its appointment to refunded; a partial one stays Captured.
    async fn record_refund(&self, payment: &Payment, refunded_total: i64) -> Result<Payment, PaymentError> {
        let refunded_total = refunded_total
            .max(payment.refunded_amount_paise)
            .min(payment.amount_paise);

        if refunded_total < payment.amount_paise {
            let updated = self.update_payment(payment.id, json!({ "refunded_amount_paise": refunded_total })).await?;
            info!(
                "Payment {} partially refunded: {} of {} paise",
                payment.id, refunded_total, payment.amount_paise
            );
            return Ok(updated);
        }

        let updated = self.update_payment(payment.id, json!({
            "status": PaymentStatus::Refunded,
            "refunded_amount_paise": refunded_total
        })).await?;

        let _: Value = self.supabase.service_request(
            Method::PATCH,
            &format!("/rest/v1/appointments?id=eq.{}", payment.appointment_id),
            Some(json!({ "payment_status": "refunded", "updated_at": Utc::now().to_rfc3339() })),
        ).await?;

        info!("Payment {} refunded", payment.id);
        Ok(updated)
    }
}
