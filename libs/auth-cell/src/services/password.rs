// libs/auth-cell/src/services/password.rs
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use rand::Rng;
use tracing::instrument;

use crate::models::{PasswordStrength, PasswordStrengthResult};

pub const RESET_CODE_LENGTH: usize = 6;

const COMMON_PASSWORDS: [&str; 15] = [
    "password", "123456", "password123", "admin", "qwerty",
    "letmein", "welcome", "monkey", "dragon", "123456789",
    "password1", "abc123", "111111", "123123", "admin123",
];

const MEDICAL_TERMS: [&str; 9] = [
    "doctor", "patient", "medical", "clinic", "hospital",
    "health", "nurse", "medicine", "treatment",
];

pub struct PasswordSecurityService;

impl PasswordSecurityService {
    #[instrument(skip(secret))]
    pub fn hash_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
        Ok(hash.to_string())
    }

    #[instrument(skip(secret, hash))]
    pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
        let parsed_hash = PasswordHash::new(hash)?;

        match Argon2::default().verify_password(secret.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Six-digit numeric code; leading zeros are kept.
    pub fn generate_reset_code() -> String {
        let mut rng = rand::thread_rng();
        (0..RESET_CODE_LENGTH)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    #[instrument(skip(password))]
    pub fn validate_password_strength(password: &str) -> PasswordStrengthResult {
        let mut score = 0u8;
        let mut issues = Vec::new();
        let mut acceptable = true;

        let length = password.chars().count();
        if length >= 12 {
            score += 25;
        } else if length >= 8 {
            score += 15;
            issues.push("Password should be at least 12 characters long".to_string());
        } else {
            acceptable = false;
            issues.push("Password must be at least 8 characters long".to_string());
        }

        if password.chars().any(|c| c.is_lowercase()) {
            score += 15;
        } else {
            acceptable = false;
            issues.push("Password must contain lowercase letters".to_string());
        }

        if password.chars().any(|c| c.is_uppercase()) {
            score += 15;
        } else {
            acceptable = false;
            issues.push("Password must contain uppercase letters".to_string());
        }

        if password.chars().any(|c| c.is_numeric()) {
            score += 15;
        } else {
            acceptable = false;
            issues.push("Password must contain numbers".to_string());
        }

        if password.chars().any(|c| "!@#$%^&*()_+-=[]{}|;:,.<>?".contains(c)) {
            score += 15;
        } else {
            issues.push("Password should contain special characters".to_string());
        }

        if Self::has_sequential_chars(password) {
            score = score.saturating_sub(20);
            issues.push("Avoid sequential characters (abc, 123)".to_string());
        }

        if Self::has_repeated_chars(password) {
            score = score.saturating_sub(15);
            issues.push("Avoid repeated characters (aaa, 111)".to_string());
        }

        let lowered = password.to_lowercase();
        if COMMON_PASSWORDS.iter().any(|common| lowered.contains(common)) {
            score = score.saturating_sub(50);
            acceptable = false;
            issues.push("Password contains common patterns".to_string());
        }

        if MEDICAL_TERMS.iter().any(|term| lowered.contains(term)) {
            score = score.saturating_sub(10);
            issues.push("Avoid using medical terms in passwords".to_string());
        }

        let strength = match score {
            0..=25 => PasswordStrength::Weak,
            26..=50 => PasswordStrength::Fair,
            51..=75 => PasswordStrength::Good,
            _ => PasswordStrength::Strong,
        };

        PasswordStrengthResult {
            strength,
            score,
            acceptable,
            issues,
        }
    }

    fn has_sequential_chars(password: &str) -> bool {
        let chars: Vec<u32> = password.chars().map(|c| c as u32).collect();

        chars.windows(3).any(|w| {
            let ascending = w[1] == w[0] + 1 && w[2] == w[1] + 1;
            let descending = w[0] == w[1] + 1 && w[1] == w[2] + 1;
            ascending || descending
        })
    }

    fn has_repeated_chars(password: &str) -> bool {
        let chars: Vec<char> = password.chars().collect();
        chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_reset_code() {
        let code = PasswordSecurityService::generate_reset_code();
        let hash = PasswordSecurityService::hash_secret(&code).unwrap();

        assert_ne!(hash, code);
        assert!(PasswordSecurityService::verify_secret(&code, &hash).unwrap());
        assert!(!PasswordSecurityService::verify_secret("not-it", &hash).unwrap());
    }

    #[test]
    fn test_reset_code_shape() {
        for _ in 0..20 {
            let code = PasswordSecurityService::generate_reset_code();
            assert_eq!(code.len(), RESET_CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_strong_password() {
        let result = PasswordSecurityService::validate_password_strength("Tr0ub4dor&Zebra!");
        assert!(result.acceptable);
        assert_eq!(result.strength, PasswordStrength::Strong);
    }

    #[test]
    fn test_short_password_rejected() {
        let result = PasswordSecurityService::validate_password_strength("Ab1!");
        assert!(!result.acceptable);
        assert!(result.issues.iter().any(|i| i.contains("at least 8")));
    }

    #[test]
    fn test_common_password_rejected() {
        let result = PasswordSecurityService::validate_password_strength("Password123");
        assert!(!result.acceptable);
        assert_eq!(result.strength, PasswordStrength::Weak);
    }

    #[test]
    fn test_missing_digit_rejected() {
        let result = PasswordSecurityService::validate_password_strength("Monsoon-Rains");
        assert!(!result.acceptable);
    }
}
