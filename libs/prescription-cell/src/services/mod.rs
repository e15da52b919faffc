// libs/prescription-cell/src/services/mod.rs
pub mod prescription;

pub use prescription::PrescriptionService;
