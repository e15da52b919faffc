// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, ConflictCheckResponse};

/// Longest bookable consultation; bounds how far back an overlapping
/// appointment can start.
const LOOKBACK_MINUTES: i64 = 120;

pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Checks the doctor's whole calendar, not only rows visible to the
    /// caller, so the read runs with the service role.
    pub async fn check_conflicts(
        &self,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        debug!("Checking conflicts for doctor {} from {} to {}", doctor_id, start_time, end_time);

        let window_start = start_time
            .checked_sub_signed(Duration::minutes(LOOKBACK_MINUTES))
            .ok_or_else(|| AppointmentError::ValidationError("Start time is out of range".to_string()))?;

        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=in.({})&appointment_date=gte.{}&appointment_date=lt.{}&order=appointment_date.asc",
            doctor_id,
            AppointmentStatus::active_filter(),
            window_start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        let rows: Vec<Value> = self.supabase.service_request(Method::GET, &path, None).await?;
        let existing = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()?;

        let conflicting_appointments = find_conflicts(existing, start_time, end_time, exclude_appointment_id);
        let has_conflict = !conflicting_appointments.is_empty();

        if has_conflict {
            warn!(
                "Conflict detected for doctor {} - {} conflicting appointments",
                doctor_id,
                conflicting_appointments.len()
            );
        }

        Ok(ConflictCheckResponse {
            has_conflict,
            conflicting_appointments,
        })
    }
}

/// Active appointments whose interval overlaps `[start, end)`.
pub fn find_conflicts(
    existing: Vec<Appointment>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    exclude_appointment_id: Option<Uuid>,
) -> Vec<Appointment> {
    existing
        .into_iter()
        .filter(|a| Some(a.id) != exclude_appointment_id)
        .filter(|a| a.status.is_active())
        .filter(|a| a.overlaps(start_time, end_time))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_utils::test_utils::MockSupabaseResponses;

    fn appointment(start: &str, status: &str) -> Appointment {
        let start: DateTime<Utc> = start.parse().unwrap();
        serde_json::from_value(MockSupabaseResponses::appointment_response(
            &Uuid::new_v4().to_string(),
            &Uuid::new_v4().to_string(),
            &Uuid::new_v4().to_string(),
            start,
            status,
        ))
        .unwrap()
    }

    #[test]
    fn test_overlap_detection() {
        let start: DateTime<Utc> = "2024-06-03T10:00:00Z".parse().unwrap();
        let end = start + Duration::minutes(30);

        let existing = vec![
            appointment("2024-06-03T09:45:00Z", "confirmed"), // ends 10:15
            appointment("2024-06-03T09:30:00Z", "pending"),   // ends 10:00, touching
            appointment("2024-06-03T10:29:00Z", "rescheduled"),
            appointment("2024-06-03T10:30:00Z", "confirmed"), // touching
            appointment("2024-06-03T10:10:00Z", "cancelled"),
        ];

        let conflicts = find_conflicts(existing, start, end, None);
        assert_eq!(conflicts.len(), 2);
        assert!(conflicts.iter().all(|a| a.status.is_active()));
    }

    #[test]
    fn test_excluded_appointment_ignored() {
        let start: DateTime<Utc> = "2024-06-03T10:00:00Z".parse().unwrap();
        let own = appointment("2024-06-03T10:00:00Z", "confirmed");
        let own_id = own.id;

        assert!(find_conflicts(vec![own], start, start + Duration::minutes(30), Some(own_id)).is_empty());
    }
}
