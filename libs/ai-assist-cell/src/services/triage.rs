// libs/ai-assist-cell/src/services/triage.rs
use crate::models::{Language, TriageAssessment, TriageRequest, Urgency};

struct RedFlagRule {
    label: &'static str,
    urgency: Urgency,
    phrases: &'static [&'static str],
}

/// English and Hinglish phrasings of symptoms that need prompt care.
const RED_FLAGS: &[RedFlagRule] = &[
    RedFlagRule {
        label: "chest pain",
        urgency: Urgency::Emergency,
        phrases: &["chest pain", "chest tightness", "seene mein dard", "seene me dard", "chhati mein dard", "chhati me dard"],
    },
    RedFlagRule {
        label: "breathing difficulty",
        urgency: Urgency::Emergency,
        phrases: &[
            "difficulty breathing", "shortness of breath", "can't breathe", "cannot breathe",
            "saans lene mein takleef", "saans lene me takleef", "saans nahi", "saans phool",
        ],
    },
    RedFlagRule {
        label: "loss of consciousness",
        urgency: Urgency::Emergency,
        phrases: &["unconscious", "fainted", "passed out", "behosh"],
    },
    RedFlagRule {
        label: "stroke signs",
        urgency: Urgency::Emergency,
        phrases: &["slurred speech", "face drooping", "one side weakness", "sudden numbness", "lakwa"],
    },
    RedFlagRule {
        label: "severe bleeding",
        urgency: Urgency::Emergency,
        phrases: &["heavy bleeding", "vomiting blood", "coughing blood", "khoon ki ulti", "bahut khoon"],
    },
    RedFlagRule {
        label: "seizure",
        urgency: Urgency::Emergency,
        phrases: &["seizure", "convulsion", "daura pad", "mirgi"],
    },
    RedFlagRule {
        label: "self-harm",
        urgency: Urgency::Emergency,
        phrases: &["suicidal", "kill myself", "end my life", "khudkushi", "jaan de dunga", "jaan de dungi"],
    },
    RedFlagRule {
        label: "high fever",
        urgency: Urgency::Urgent,
        phrases: &["high fever", "very high temperature", "tez bukhar"],
    },
    RedFlagRule {
        label: "severe pain",
        urgency: Urgency::Urgent,
        phrases: &["severe pain", "severe headache", "unbearable pain", "bahut tez dard", "asahniya dard"],
    },
    RedFlagRule {
        label: "blood in urine or stool",
        urgency: Urgency::Urgent,
        phrases: &["blood in urine", "blood in stool", "peshab mein khoon", "potty mein khoon"],
    },
    RedFlagRule {
        label: "persistent vomiting",
        urgency: Urgency::Urgent,
        phrases: &["persistent vomiting", "can't keep water down", "baar baar ulti"],
    },
];

/// Keyword to specialty routing; first match wins.
const SPECIALTIES: &[(&str, &[&str])] = &[
    ("Cardiology", &["chest", "heart", "palpitation", "seene", "chhati", "dil"]),
    ("Pulmonology", &["breath", "cough", "wheez", "asthma", "saans", "khansi"]),
    ("Neurology", &["headache", "seizure", "numbness", "dizz", "migraine", "sir dard", "sar dard", "chakkar", "lakwa"]),
    ("Gastroenterology", &["stomach", "abdominal", "vomit", "diarrh", "stool", "pet", "ulti", "dast"]),
    ("Dermatology", &["rash", "skin", "itch", "acne", "khujli", "daane"]),
    ("Psychiatry", &["anxiety", "depress", "suicid", "panic", "tanav", "udaas"]),
    ("Urology", &["urine", "urinat", "peshab"]),
];

const GENERAL_MEDICINE: &str = "General Medicine";
const EMERGENCY_MEDICINE: &str = "Emergency Medicine";

/// Deterministic red-flag screen that runs before (and bounds) any model
/// refinement.
#[derive(Debug, Default, Clone, Copy)]
pub struct TriageRules;

impl TriageRules {
    pub fn new() -> Self {
        Self
    }

    /// Labels of red flags found in the text with the highest urgency they imply.
    pub fn screen(&self, text: &str) -> (Vec<String>, Option<Urgency>) {
        let text = text.to_lowercase();
        let mut labels = Vec::new();
        let mut worst: Option<Urgency> = None;

        for rule in RED_FLAGS {
            if rule.phrases.iter().any(|phrase| text.contains(phrase)) {
                labels.push(rule.label.to_string());
                worst = worst.max(Some(rule.urgency));
            }
        }

        (labels, worst)
    }

    pub fn is_emergency(&self, text: &str) -> bool {
        self.screen(text).1 == Some(Urgency::Emergency)
    }

    pub fn specialty_for(&self, text: &str) -> &'static str {
        let text = text.to_lowercase();
        SPECIALTIES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|keyword| text.contains(keyword)))
            .map(|(specialty, _)| *specialty)
            .unwrap_or(GENERAL_MEDICINE)
    }

    pub fn assess(&self, request: &TriageRequest, language: Language) -> TriageAssessment {
        let (red_flags, flagged) = self.screen(&request.symptoms);

        let urgency = flagged.unwrap_or_else(|| {
            let vulnerable = request.age.is_some_and(|age| age < 5 || age >= 65);
            let short_lived = request.duration_days.is_some_and(|days| days <= 2);
            if short_lived && !vulnerable {
                Urgency::SelfCare
            } else {
                Urgency::Routine
            }
        });

        let recommended_specialty = if urgency == Urgency::Emergency {
            EMERGENCY_MEDICINE
        } else {
            self.specialty_for(&request.symptoms)
        };

        TriageAssessment {
            urgency,
            red_flags,
            recommended_specialty: recommended_specialty.to_string(),
            advice: urgency.advice().to_string(),
            language,
            ai_refined: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(symptoms: &str, age: Option<u32>, duration_days: Option<u32>) -> TriageRequest {
        TriageRequest { symptoms: symptoms.to_string(), age, duration_days }
    }

    #[test]
    fn test_english_emergency() {
        let rules = TriageRules::new();
        let assessment = rules.assess(&request("Crushing chest pain and sweating", Some(55), Some(0)), Language::En);

        assert_eq!(assessment.urgency, Urgency::Emergency);
        assert_eq!(assessment.red_flags, vec!["chest pain".to_string()]);
        assert_eq!(assessment.recommended_specialty, "Emergency Medicine");
    }

    #[test]
    fn test_hinglish_emergency() {
        let rules = TriageRules::new();
        let (flags, urgency) = rules.screen("Mujhe saans lene mein takleef ho rahi hai");

        assert_eq!(flags, vec!["breathing difficulty".to_string()]);
        assert_eq!(urgency, Some(Urgency::Emergency));
    }

    #[test]
    fn test_worst_flag_wins() {
        let rules = TriageRules::new();
        let (flags, urgency) = rules.screen("high fever and then a seizure");

        assert_eq!(flags.len(), 2);
        assert_eq!(urgency, Some(Urgency::Emergency));
    }

    #[test]
    fn test_urgent_flag_routes_to_specialty() {
        let rules = TriageRules::new();
        let assessment = rules.assess(&request("tez bukhar aur khansi", Some(30), Some(1)), Language::Hinglish);

        assert_eq!(assessment.urgency, Urgency::Urgent);
        assert_eq!(assessment.recommended_specialty, "Pulmonology");
        assert_eq!(assessment.language, Language::Hinglish);
    }

    #[test]
    fn test_mild_short_symptoms_are_self_care() {
        let rules = TriageRules::new();
        let assessment = rules.assess(&request("runny nose", Some(28), Some(1)), Language::En);

        assert_eq!(assessment.urgency, Urgency::SelfCare);
        assert!(assessment.red_flags.is_empty());
        assert_eq!(assessment.recommended_specialty, "General Medicine");
    }

    #[test]
    fn test_vulnerable_age_or_long_duration_is_routine() {
        let rules = TriageRules::new();

        assert_eq!(rules.assess(&request("runny nose", Some(70), Some(1)), Language::En).urgency, Urgency::Routine);
        assert_eq!(rules.assess(&request("runny nose", Some(30), Some(10)), Language::En).urgency, Urgency::Routine);
        assert_eq!(rules.assess(&request("runny nose", None, None), Language::En).urgency, Urgency::Routine);
    }

    #[test]
    fn test_specialty_keywords() {
        let rules = TriageRules::new();
        assert_eq!(rules.specialty_for("itchy skin rash"), "Dermatology");
        assert_eq!(rules.specialty_for("pet mein dard"), "Gastroenterology");
        assert_eq!(rules.specialty_for("sar dard aur chakkar"), "Neurology");
    }
}
