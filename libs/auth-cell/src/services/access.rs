// libs/auth-cell/src/services/access.rs
use anyhow::Result;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;

/// Ownership checks shared by every cell that exposes patient data.
///
/// Patients own the `patients` row whose `user_id` is theirs; doctors own
/// the matching `doctors` row and may see a patient once an appointment
/// links the two.
pub struct AccessControlService {
    supabase: SupabaseClient,
}

impl AccessControlService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn patient_id_for_user(&self, user_id: &str, auth_token: &str) -> Result<Option<String>> {
        let path = format!("/rest/v1/patients?user_id=eq.{}&select=id", user_id);
        let row = self.supabase.fetch_one(&path, Some(auth_token)).await?;
        Ok(row.and_then(|r| r["id"].as_str().map(str::to_string)))
    }

    pub async fn doctor_id_for_user(&self, user_id: &str, auth_token: &str) -> Result<Option<String>> {
        let path = format!("/rest/v1/doctors?user_id=eq.{}&select=id", user_id);
        let row = self.supabase.fetch_one(&path, Some(auth_token)).await?;
        Ok(row.and_then(|r| r["id"].as_str().map(str::to_string)))
    }

    pub async fn doctor_has_patient(
        &self,
        doctor_id: &str,
        patient_id: &str,
        auth_token: &str,
    ) -> Result<bool> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&patient_id=eq.{}&select=id&limit=1",
            doctor_id, patient_id
        );
        Ok(self.supabase.fetch_one(&path, Some(auth_token)).await?.is_some())
    }

    pub async fn can_access_patient(&self, user: &User, patient_id: &str, auth_token: &str) -> Result<bool> {
        debug!("Checking access of user {} to patient {}", user.id, patient_id);

        match user.app_role() {
            Some(UserRole::Admin) => Ok(true),
            Some(UserRole::Patient) => Ok(self
                .patient_id_for_user(&user.id, auth_token)
                .await?
                .is_some_and(|own| own == patient_id)),
            Some(UserRole::Doctor) => match self.doctor_id_for_user(&user.id, auth_token).await? {
                Some(doctor_id) => self.doctor_has_patient(&doctor_id, patient_id, auth_token).await,
                None => Ok(false),
            },
            None => Ok(false),
        }
    }

    pub async fn is_doctor_owner(&self, user: &User, doctor_id: &str, auth_token: &str) -> Result<bool> {
        if user.is_admin() {
            return Ok(true);
        }
        if !user.is_doctor() {
            return Ok(false);
        }
        Ok(self
            .doctor_id_for_user(&user.id, auth_token)
            .await?
            .is_some_and(|own| own == doctor_id))
    }

    pub async fn ensure_patient_access(
        &self,
        user: &User,
        patient_id: &str,
        auth_token: &str,
    ) -> Result<(), AppError> {
        let allowed = self
            .can_access_patient(user, patient_id, auth_token)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if allowed {
            Ok(())
        } else {
            Err(AppError::Forbidden("Not authorized to access this patient".to_string()))
        }
    }

    pub async fn ensure_doctor_owner(
        &self,
        user: &User,
        doctor_id: &str,
        auth_token: &str,
    ) -> Result<(), AppError> {
        let allowed = self
            .is_doctor_owner(user, doctor_id, auth_token)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if allowed {
            Ok(())
        } else {
            Err(AppError::Forbidden("Not authorized to manage this doctor profile".to_string()))
        }
    }
}
