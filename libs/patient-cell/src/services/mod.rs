// libs/patient-cell/src/services/mod.rs
pub mod patient;

pub use patient::PatientService;
