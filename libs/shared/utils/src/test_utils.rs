use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub external_base_url: Option<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            external_base_url: None,
        }
    }
}

impl TestConfig {
    /// Points the store and every external provider (Razorpay, OpenAI,
    /// Cloudflare) at a single mock server.
    pub fn with_mock_server(uri: &str) -> Self {
        Self {
            supabase_url: uri.to_string(),
            external_base_url: Some(uri.to_string()),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        let external = |default: &str| {
            self.external_base_url
                .clone()
                .unwrap_or_else(|| default.to_string())
        };

        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            supabase_service_role_key: self.supabase_service_role_key.clone(),
            cloudflare_realtime_app_id: "test-app-id".to_string(),
            cloudflare_realtime_api_token: "test-cloudflare-token".to_string(),
            cloudflare_realtime_base_url: external(shared_config::DEFAULT_CLOUDFLARE_REALTIME_BASE_URL),
            razorpay_key_id: "rzp_test_key".to_string(),
            razorpay_key_secret: "rzp_test_secret".to_string(),
            razorpay_webhook_secret: "rzp_webhook_secret".to_string(),
            razorpay_base_url: external(shared_config::DEFAULT_RAZORPAY_BASE_URL),
            openai_api_key: "test-openai-key".to_string(),
            openai_base_url: external(shared_config::DEFAULT_OPENAI_BASE_URL),
            openai_model: "gpt-test".to_string(),
            password_reset_ttl_minutes: 15,
            password_reset_max_attempts: 5,
            port: 3000,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }

    pub fn bearer(user: &TestUser, config: &AppConfig) -> String {
        format!("Bearer {}", Self::create_test_token(user, &config.supabase_jwt_secret, Some(24)))
    }
}

/// Store rows shaped like the tables each cell reads.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn patient_response(patient_id: &str, user_id: &str) -> serde_json::Value {
        json!({
            "id": patient_id,
            "user_id": user_id,
            "first_name": "Asha",
            "last_name": "Verma",
            "email": "asha@example.com",
            "phone_number": "+919812345678",
            "date_of_birth": "1990-05-14",
            "gender": "female",
            "address": "12 MG Road",
            "city": "Pune",
            "state": "Maharashtra",
            "pincode": "411001",
            "blood_group": "B+",
            "preferred_language": "hi",
            "allergies": ["penicillin"],
            "chronic_conditions": [],
            "current_medications": [],
            "emergency_contact_name": null,
            "emergency_contact_phone": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn doctor_response(doctor_id: &str, user_id: &str) -> serde_json::Value {
        json!({
            "id": doctor_id,
            "user_id": user_id,
            "first_name": "Rohan",
            "last_name": "Mehta",
            "email": "rohan.mehta@example.com",
            "phone_number": "+919876543210",
            "specialty": "General Medicine",
            "qualification": "MBBS, MD",
            "registration_number": "MMC-2011-4567",
            "years_experience": 12,
            "languages": ["en", "hi"],
            "consultation_fee": 500.0,
            "bio": "Family physician",
            "is_verified": true,
            "is_available": true,
            "rating": 4.6,
            "timezone": "Asia/Kolkata",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn availability_response(doctor_id: &str, day_of_week: i32, start: &str, end: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "day_of_week": day_of_week,
            "start_time": start,
            "end_time": end,
            "slot_duration_minutes": 30,
            "is_active": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn appointment_response(
        appointment_id: &str,
        patient_id: &str,
        doctor_id: &str,
        start: DateTime<Utc>,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "appointment_date": start.to_rfc3339(),
            "duration_minutes": 30,
            "status": status,
            "appointment_type": "consultation",
            "consultation_mode": "video",
            "reason": "Fever and cough",
            "patient_notes": null,
            "doctor_notes": null,
            "cancellation_reason": null,
            "payment_status": "pending",
            "prescription_issued": false,
            "video_session_id": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn medical_record_response(
        record_id: &str,
        patient_id: &str,
        doctor_id: Option<&str>,
        created_by: &str,
        is_confidential: bool,
    ) -> serde_json::Value {
        json!({
            "id": record_id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "appointment_id": null,
            "record_type": "consultation",
            "title": "Viral fever follow-up",
            "description": "Patient recovering well",
            "diagnosis": "Viral fever",
            "symptoms": ["fever", "fatigue"],
            "vitals": { "temperature_c": 37.8 },
            "icd10_codes": ["B34.9"],
            "attachments": [],
            "is_confidential": is_confidential,
            "created_by": created_by,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn prescription_response(
        prescription_id: &str,
        patient_id: &str,
        doctor_id: &str,
        appointment_id: &str,
        status: &str,
        valid_until: DateTime<Utc>,
    ) -> serde_json::Value {
        json!({
            "id": prescription_id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "appointment_id": appointment_id,
            "diagnosis": "Acute pharyngitis",
            "medications": [{
                "name": "Paracetamol",
                "dosage": "500 mg",
                "frequency": "Three times a day",
                "duration_days": 5,
                "route": "oral",
                "instructions": "After food"
            }],
            "notes": null,
            "status": status,
            "issued_at": "2024-01-01T00:00:00Z",
            "valid_until": valid_until.to_rfc3339()
        })
    }

    pub fn payment_response(
        payment_id: &str,
        appointment_id: &str,
        patient_id: &str,
        order_id: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": payment_id,
            "appointment_id": appointment_id,
            "patient_id": patient_id,
            "razorpay_order_id": order_id,
            "razorpay_payment_id": null,
            "amount_paise": 50000,
            "refunded_amount_paise": 0,
            "currency": "INR",
            "status": status,
            "failure_reason": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "error": {
                "message": message,
                "code": code
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(!app_config.supabase_jwt_secret.is_empty());
        assert!(app_config.is_payments_configured());
        assert!(app_config.is_ai_configured());
    }

    #[test]
    fn test_mock_server_config_routes_all_providers() {
        let config = TestConfig::with_mock_server("http://127.0.0.1:9999").to_app_config();
        assert_eq!(config.supabase_url, "http://127.0.0.1:9999");
        assert_eq!(config.razorpay_base_url, "http://127.0.0.1:9999");
        assert_eq!(config.openai_base_url, "http://127.0.0.1:9999");
        assert_eq!(config.cloudflare_realtime_base_url, "http://127.0.0.1:9999");
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::doctor("doc@example.com");
        assert_eq!(user.email, "doc@example.com");
        assert_eq!(user.role, "doctor");

        let user_model = user.to_user();
        assert_eq!(user_model.email, Some(user.email.clone()));
        assert_eq!(user_model.role, Some(user.role.clone()));
        assert_eq!(user_model.id, user.id);
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let token = JwtTestUtils::create_test_token(&user, "test-secret", Some(1));

        assert_eq!(token.split('.').count(), 3);
    }
}
