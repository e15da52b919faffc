// libs/auth-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::error::AppError;

/// One-time password reset code issued to an account email.
///
/// Only the argon2 hash of the code is persisted. A token stops being usable
/// once it expires, is consumed, or has absorbed `max_attempts` wrong guesses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: String,
    pub email: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn remaining_attempts(&self) -> i32 {
        (self.max_attempts - self.attempts).max(0)
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.is_expired(now) && !self.attempts_exhausted()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordStrengthRequest {
    pub password: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PasswordStrength {
    Weak,
    Fair,
    Good,
    Strong,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordStrengthResult {
    pub strength: PasswordStrength,
    pub score: u8,
    pub acceptable: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Invalid or unknown reset code ({remaining_attempts} attempts remaining)")]
    InvalidCode { remaining_attempts: i32 },

    #[error("Reset code has expired, request a new one")]
    CodeExpired,

    #[error("Reset code locked after too many failed attempts")]
    TooManyAttempts,

    #[error("Another reset attempt for this code is in progress, try again")]
    AttemptInProgress,

    #[error("Password does not meet requirements: {}", .0.join("; "))]
    WeakPassword(Vec<String>),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Database(err.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidEmail
            | AuthError::InvalidCode { .. }
            | AuthError::CodeExpired
            | AuthError::WeakPassword(_) => AppError::BadRequest(err.to_string()),
            AuthError::TooManyAttempts => AppError::TooManyRequests(err.to_string()),
            AuthError::AttemptInProgress => AppError::Conflict(err.to_string()),
            AuthError::Hashing(_) => AppError::Internal(err.to_string()),
            AuthError::Database(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(attempts: i32, used: bool, expires_in_minutes: i64) -> PasswordResetToken {
        let now = Utc::now();
        PasswordResetToken {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            email: "a@example.com".to_string(),
            code_hash: String::new(),
            expires_at: now + Duration::minutes(expires_in_minutes),
            attempts,
            max_attempts: 5,
            used,
            created_at: now,
        }
    }

    #[test]
    fn test_fresh_token_is_usable() {
        let t = token(0, false, 15);
        assert!(t.is_usable(Utc::now()));
        assert_eq!(t.remaining_attempts(), 5);
    }

    #[test]
    fn test_expiry_boundary() {
        let t = token(0, false, 15);
        assert!(!t.is_expired(t.expires_at - Duration::seconds(1)));
        assert!(t.is_expired(t.expires_at));
    }

    #[test]
    fn test_attempts_exhausted() {
        let t = token(5, false, 15);
        assert!(t.attempts_exhausted());
        assert!(!t.is_usable(Utc::now()));
        assert_eq!(token(7, false, 15).remaining_attempts(), 0);
    }

    #[test]
    fn test_used_token_is_not_usable() {
        assert!(!token(0, true, 15).is_usable(Utc::now()));
    }

    #[test]
    fn test_error_mapping() {
        let app: AppError = AuthError::TooManyAttempts.into();
        assert!(matches!(app, AppError::TooManyRequests(_)));

        let app: AppError = AuthError::CodeExpired.into();
        assert!(matches!(app, AppError::BadRequest(_)));
    }
}
