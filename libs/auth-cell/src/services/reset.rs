// libs/auth-cell/src/services/reset.rs
use chrono::{Duration, Utc};
use regex::Regex;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{AuthError, PasswordResetToken};
use crate::services::password::PasswordSecurityService;

/// Issues and redeems one-time password reset codes.
///
/// Runs without a caller session, so every store call uses the service role.
/// Codes reach the user through the `notification_outbox` table, which the
/// mail dispatcher drains.
pub struct PasswordResetService {
    supabase: SupabaseClient,
    ttl: Duration,
    max_attempts: i32,
    email_pattern: Regex,
}

impl PasswordResetService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            ttl: Duration::minutes(config.password_reset_ttl_minutes.max(1)),
            max_attempts: config.password_reset_max_attempts.max(1),
            email_pattern: Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")
                .expect("email pattern is valid"),
        }
    }

    fn normalize_email(&self, email: &str) -> Result<String, AuthError> {
        let email = email.trim().to_lowercase();
        if !self.email_pattern.is_match(&email) {
            return Err(AuthError::InvalidEmail);
        }
        Ok(email)
    }

    /// Starts a reset. Unknown emails succeed silently so callers cannot discover
    /// which addresses hold accounts.
    #[instrument(skip(self))]
    pub async fn request_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = self.normalize_email(email)?;
        let encoded = urlencoding::encode(&email);

        let profiles: Vec<Value> = self.supabase.service_request(
            Method::GET,
            &format!("/rest/v1/profiles?email=eq.{}&select=id,email", encoded),
            None,
        ).await?;

        let Some(user_id) = profiles
            .first()
            .and_then(|p| p["id"].as_str())
            .map(str::to_string)
        else {
            info!("Password reset requested for unknown email");
            return Ok(());
        };

        let _: Value = self.supabase.service_request(
            Method::PATCH,
            &format!("/rest/v1/password_reset_tokens?email=eq.{}&used=eq.false", encoded),
            Some(json!({ "used": true })),
        ).await?;

        let code = PasswordSecurityService::generate_reset_code();
        let code_hash = PasswordSecurityService::hash_secret(&code)
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        let now = Utc::now();

        let _: Vec<Value> = self.supabase.service_request(
            Method::POST,
            "/rest/v1/password_reset_tokens",
            Some(json!({
                "user_id": user_id,
                "email": email,
                "code_hash": code_hash,
                "expires_at": (now + self.ttl).to_rfc3339(),
                "attempts": 0,
                "max_attempts": self.max_attempts,
                "used": false,
                "created_at": now.to_rfc3339(),
            })),
        ).await?;

        let _: Vec<Value> = self.supabase.service_request(
            Method::POST,
            "/rest/v1/notification_outbox",
            Some(json!({
                "channel": "email",
                "recipient": email,
                "template": "password_reset",
                "payload": {
                    "code": code,
                    "expires_in_minutes": self.ttl.num_minutes(),
                },
                "created_at": now.to_rfc3339(),
            })),
        ).await?;

        info!("Password reset code issued for user {}", user_id);
        Ok(())
    }

    #[instrument(skip(self, code, new_password))]
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let email = self.normalize_email(email)?;

        let strength = PasswordSecurityService::validate_password_strength(new_password);
        if !strength.acceptable {
            return Err(AuthError::WeakPassword(strength.issues));
        }

        let token = self.latest_open_token(&email).await?
            .ok_or(AuthError::InvalidCode { remaining_attempts: 0 })?;

        let now = Utc::now();
        if token.is_expired(now) {
            return Err(AuthError::CodeExpired);
        }
        if token.attempts_exhausted() {
            return Err(AuthError::TooManyAttempts);
        }

        // The attempt is reserved before the code is checked. The PATCH only
        // applies while the counter still holds the value read above, so
        // concurrent guesses cannot share one slot.
        let attempts = token.attempts + 1;
        let reserved = self.update_token_if(
            &token,
            &format!("attempts=eq.{}&used=eq.false", token.attempts),
            json!({ "attempts": attempts }),
        ).await?;
        if !reserved {
            warn!("Concurrent reset attempt lost the race for token {}", token.id);
            return Err(AuthError::AttemptInProgress);
        }

        let matches = PasswordSecurityService::verify_secret(code.trim(), &token.code_hash)
            .map_err(|e| AuthError::Hashing(e.to_string()))?;

        if !matches {
            warn!("Wrong reset code for token {} ({} attempts)", token.id, attempts);

            if attempts >= token.max_attempts {
                return Err(AuthError::TooManyAttempts);
            }
            return Err(AuthError::InvalidCode {
                remaining_attempts: token.max_attempts - attempts,
            });
        }

        // Claim the token before touching the password so a code works once.
        if !self.update_token_if(&token, "used=eq.false", json!({ "used": true })).await? {
            return Err(AuthError::InvalidCode { remaining_attempts: 0 });
        }

        self.supabase
            .admin_update_user_password(&token.user_id, new_password)
            .await?;

        info!("Password reset completed for user {}", token.user_id);
        Ok(())
    }

    async fn latest_open_token(&self, email: &str) -> Result<Option<PasswordResetToken>, AuthError> {
        let path = format!(
            "/rest/v1/password_reset_tokens?email=eq.{}&used=eq.false&order=created_at.desc&limit=1",
            urlencoding::encode(email)
        );
        let rows: Vec<Value> = self.supabase.service_request(Method::GET, &path, None).await?;

        match rows.into_iter().next() {
            Some(row) => {
                let token = serde_json::from_value(row)
                    .map_err(|e| AuthError::Database(e.to_string()))?;
                Ok(Some(token))
            }
            None => {
                debug!("No open reset token for email");
                Ok(None)
            }
        }
    }

    /// Conditional update; false when no row matched `filter` any more.
    async fn update_token_if(&self, token: &PasswordResetToken, filter: &str, patch: Value) -> Result<bool, AuthError> {
        let rows: Vec<Value> = self.supabase.service_request(
            Method::PATCH,
            &format!("/rest/v1/password_reset_tokens?id=eq.{}&{}", token.id, filter),
            Some(patch),
        ).await?;
        Ok(!rows.is_empty())
    }
}
