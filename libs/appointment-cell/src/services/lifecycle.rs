// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// Timing rules for the appointment lifecycle.
#[derive(Debug, Clone)]
pub struct AppointmentLifecycleRules {
    pub max_early_start_minutes: i64,
    pub max_late_start_minutes: i64,
    pub no_show_threshold_minutes: i64,
    pub min_patient_cancellation_notice_hours: i64,
    pub min_duration_minutes: i32,
    pub max_duration_minutes: i32,
    pub max_booking_horizon_days: i64,
}

impl Default for AppointmentLifecycleRules {
    fn default() -> Self {
        Self {
            max_early_start_minutes: 15,
            max_late_start_minutes: 30,
            no_show_threshold_minutes: 30,
            min_patient_cancellation_notice_hours: 2,
            min_duration_minutes: 10,
            max_duration_minutes: 120,
            max_booking_horizon_days: 365,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentLifecycleService {
    rules: AppointmentLifecycleRules,
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &AppointmentLifecycleRules {
        &self.rules
    }

    pub fn valid_transitions(&self, current_status: AppointmentStatus) -> &'static [AppointmentStatus] {
        use AppointmentStatus::*;

        match current_status {
            Pending => &[Confirmed, Cancelled, NoShow],
            Confirmed => &[InProgress, Cancelled, NoShow, Rescheduled],
            InProgress => &[Completed, Cancelled],
            Rescheduled => &[Confirmed, Cancelled],
            Completed | Cancelled | NoShow => &[],
        }
    }

    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }
        Ok(())
    }

    /// Confirmed consultations may start from 15 minutes before to 30
    /// minutes after the scheduled time.
    pub fn can_start_appointment(
        &self,
        current_status: AppointmentStatus,
        scheduled_start_time: DateTime<Utc>,
        current_time: DateTime<Utc>,
    ) -> bool {
        if current_status != AppointmentStatus::Confirmed {
            return false;
        }

        let earliest_start = scheduled_start_time - Duration::minutes(self.rules.max_early_start_minutes);
        let latest_start = scheduled_start_time + Duration::minutes(self.rules.max_late_start_minutes);

        current_time >= earliest_start && current_time <= latest_start
    }

    pub fn should_mark_no_show(
        &self,
        current_status: AppointmentStatus,
        scheduled_start_time: DateTime<Utc>,
        current_time: DateTime<Utc>,
    ) -> bool {
        if !matches!(current_status, AppointmentStatus::Confirmed | AppointmentStatus::Pending) {
            return false;
        }

        current_time > scheduled_start_time + Duration::minutes(self.rules.no_show_threshold_minutes)
    }

    pub fn can_patient_cancel(&self, scheduled_start_time: DateTime<Utc>, current_time: DateTime<Utc>) -> bool {
        scheduled_start_time - current_time >= Duration::hours(self.rules.min_patient_cancellation_notice_hours)
    }

    pub fn validate_appointment_timing(
        &self,
        scheduled_start_time: DateTime<Utc>,
        duration_minutes: i32,
        current_time: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if scheduled_start_time <= current_time {
            return Err(AppointmentError::InvalidTime(
                "Appointment must be scheduled for a future time".to_string(),
            ));
        }

        if !(self.rules.min_duration_minutes..=self.rules.max_duration_minutes).contains(&duration_minutes) {
            return Err(AppointmentError::InvalidTime(format!(
                "Duration must be between {} and {} minutes",
                self.rules.min_duration_minutes, self.rules.max_duration_minutes
            )));
        }

        let horizon = current_time
            .checked_add_signed(Duration::days(self.rules.max_booking_horizon_days))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if scheduled_start_time > horizon {
            return Err(AppointmentError::InvalidTime(format!(
                "Appointments can be booked at most {} days ahead",
                self.rules.max_booking_horizon_days
            )));
        }

        Ok(())
    }
}

/// End of an appointment, rejecting durations that would leave chrono's range.
pub fn appointment_end(start: DateTime<Utc>, duration_minutes: i32) -> Result<DateTime<Utc>, AppointmentError> {
    start
        .checked_add_signed(Duration::minutes(duration_minutes as i64))
        .ok_or_else(|| AppointmentError::ValidationError("Appointment end time is out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    fn t0() -> DateTime<Utc> {
        "2024-06-03T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_transition_table() {
        let lifecycle = AppointmentLifecycleService::new();

        assert!(lifecycle.validate_status_transition(Pending, Confirmed).is_ok());
        assert!(lifecycle.validate_status_transition(Confirmed, Rescheduled).is_ok());
        assert!(lifecycle.validate_status_transition(Rescheduled, Confirmed).is_ok());
        assert!(lifecycle.validate_status_transition(InProgress, Completed).is_ok());

        assert!(lifecycle.validate_status_transition(Pending, InProgress).is_err());
        assert!(lifecycle.validate_status_transition(Pending, Rescheduled).is_err());
        assert!(lifecycle.validate_status_transition(InProgress, NoShow).is_err());

        for terminal in [Completed, Cancelled, NoShow] {
            assert!(lifecycle.valid_transitions(terminal).is_empty());
            assert!(lifecycle.validate_status_transition(terminal, Confirmed).is_err());
        }
    }

    #[test]
    fn test_start_window() {
        let lifecycle = AppointmentLifecycleService::new();

        assert!(lifecycle.can_start_appointment(Confirmed, t0(), t0() - Duration::minutes(15)));
        assert!(lifecycle.can_start_appointment(Confirmed, t0(), t0() + Duration::minutes(30)));
        assert!(!lifecycle.can_start_appointment(Confirmed, t0(), t0() - Duration::minutes(16)));
        assert!(!lifecycle.can_start_appointment(Confirmed, t0(), t0() + Duration::minutes(31)));
        assert!(!lifecycle.can_start_appointment(Pending, t0(), t0()));
    }

    #[test]
    fn test_no_show_threshold() {
        let lifecycle = AppointmentLifecycleService::new();

        assert!(!lifecycle.should_mark_no_show(Confirmed, t0(), t0() + Duration::minutes(30)));
        assert!(lifecycle.should_mark_no_show(Confirmed, t0(), t0() + Duration::minutes(31)));
        assert!(lifecycle.should_mark_no_show(Pending, t0(), t0() + Duration::hours(2)));
        assert!(!lifecycle.should_mark_no_show(InProgress, t0(), t0() + Duration::hours(2)));
    }

    #[test]
    fn test_patient_cancellation_notice() {
        let lifecycle = AppointmentLifecycleService::new();

        assert!(lifecycle.can_patient_cancel(t0(), t0() - Duration::hours(2)));
        assert!(!lifecycle.can_patient_cancel(t0(), t0() - Duration::minutes(119)));
    }

    #[test]
    fn test_booking_timing() {
        let lifecycle = AppointmentLifecycleService::new();
        let now = t0() - Duration::days(1);

        assert!(lifecycle.validate_appointment_timing(t0(), 30, now).is_ok());
        assert!(lifecycle.validate_appointment_timing(t0(), 9, now).is_err());
        assert!(lifecycle.validate_appointment_timing(t0(), 121, now).is_err());
        assert!(lifecycle.validate_appointment_timing(t0(), 30, t0()).is_err());
        assert!(lifecycle.validate_appointment_timing(now + Duration::days(365), 30, now).is_ok());
        assert!(lifecycle.validate_appointment_timing(now + Duration::days(366), 30, now).is_err());
    }

    #[test]
    fn test_appointment_end_near_max_date() {
        let start: DateTime<Utc> = "2024-06-03T10:00:00Z".parse().unwrap();
        assert_eq!(appointment_end(start, 30).unwrap(), start + Duration::minutes(30));

        let last_hour = DateTime::<Utc>::MAX_UTC - Duration::minutes(60);
        assert!(matches!(
            appointment_end(last_hour, 120),
            Err(AppointmentError::ValidationError(_))
        ));
    }
}
