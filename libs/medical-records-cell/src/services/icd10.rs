// libs/medical-records-cell/src/services/icd10.rs
use regex::Regex;

/// Structural check for ICD-10 codes such as `J06.9` or `E11`.
/// Chapter `U` is reserved for special purposes and rejected.
pub struct Icd10Validator {
    pattern: Regex,
}

impl Default for Icd10Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Icd10Validator {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"^[A-TV-Z][0-9][0-9AB](\.[0-9A-TV-Z]{1,4})?$")
                .expect("ICD-10 pattern is valid"),
        }
    }

    pub fn normalize(code: &str) -> String {
        code.trim().to_uppercase()
    }

    pub fn is_valid(&self, code: &str) -> bool {
        self.pattern.is_match(&Self::normalize(code))
    }

    /// Normalizes every code, failing on the first invalid one.
    pub fn normalize_all(&self, codes: &[String]) -> Result<Vec<String>, String> {
        codes
            .iter()
            .map(|code| {
                let normalized = Self::normalize(code);
                if self.pattern.is_match(&normalized) {
                    Ok(normalized)
                } else {
                    Err(code.clone())
                }
            })
            .collect()
    }
}
