// libs/doctor-cell/src/services/mod.rs
pub mod availability;
pub mod doctor;

pub use availability::AvailabilityService;
pub use doctor::DoctorService;
