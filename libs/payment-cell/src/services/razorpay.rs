// libs/payment-cell/src/services/razorpay.rs
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::{PaymentError, RazorpayOrder, RazorpayOrderRequest, RazorpayRefund};

/// Razorpay REST client. Authenticates with HTTP basic auth
/// (`key_id:key_secret`) on every call.
pub struct RazorpayClient {
    client: Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

impl RazorpayClient {
    pub fn new(config: &AppConfig) -> Result<Self, PaymentError> {
        if !config.is_payments_configured() {
            return Err(PaymentError::NotConfigured);
        }

        Ok(Self {
            client: Client::new(),
            key_id: config.razorpay_key_id.clone(),
            key_secret: config.razorpay_key_secret.clone(),
            base_url: config.razorpay_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// POST /orders
    pub async fn create_order(&self, request: &RazorpayOrderRequest) -> Result<RazorpayOrder, PaymentError> {
        info!("Creating Razorpay order for receipt {} ({} paise)", request.receipt, request.amount);

        let order: RazorpayOrder = self.post("/orders", json!(request)).await?;

        info!("Created Razorpay order {}", order.id);
        Ok(order)
    }

    /// POST /payments/{id}/refund. Omitting the amount refunds in full.
    pub async fn refund_payment(
        &self,
        razorpay_payment_id: &str,
        amount_paise: Option<i64>,
    ) -> Result<RazorpayRefund, PaymentError> {
        info!("Requesting refund for Razorpay payment {}", razorpay_payment_id);

        let body = match amount_paise {
            Some(amount) => json!({ "amount": amount }),
            None => json!({}),
        };
        let path = format!("/payments/{}/refund", razorpay_payment_id);

        self.post(&path, body).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, PaymentError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Sending Razorpay request to: {}", url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("Razorpay request to {} failed: {} - {}", path, status, response_text);
            let description = serde_json::from_str::<Value>(&response_text)
                .ok()
                .and_then(|v| v["error"]["description"].as_str().map(str::to_string))
                .unwrap_or(response_text);
            return Err(PaymentError::GatewayError(format!("HTTP {}: {}", status, description)));
        }

        serde_json::from_str(&response_text).map_err(|e| {
            PaymentError::GatewayError(format!("Failed to parse Razorpay response: {}", e))
        })
    }
}
