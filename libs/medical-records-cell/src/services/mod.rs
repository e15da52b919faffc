// libs/medical-records-cell/src/services/mod.rs
pub mod icd10;
pub mod records;

pub use icd10::Icd10Validator;
pub use records::MedicalRecordService;
