// libs/doctor-cell/src/lib.rs
pub mod handlers;
pub mod router;
pub mod models;
pub mod services;
pub mod timezone;

pub use models::*;
pub use router::doctor_routes;
pub use services::{AvailabilityService, DoctorService};
