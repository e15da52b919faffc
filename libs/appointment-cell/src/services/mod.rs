// libs/appointment-cell/src/services/mod.rs
pub mod booking;
pub mod conflict;
pub mod lifecycle;

pub use booking::{AppointmentBookingService, CallerScope};
pub use conflict::ConflictDetectionService;
pub use lifecycle::{AppointmentLifecycleRules, AppointmentLifecycleService};
