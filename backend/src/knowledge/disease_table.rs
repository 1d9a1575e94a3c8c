use lazy_static::lazy_static;
use shared::Severity;
use std::collections::HashMap;

pub const FALLBACK_TREATMENT: &str = "Consult agricultural expert for proper diagnosis.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiseaseRecord {
    pub severity: Severity,
    pub treatment: &'static str,
}

const FALLBACK: DiseaseRecord = DiseaseRecord {
    severity: Severity::Unknown,
    treatment: FALLBACK_TREATMENT,
};

lazy_static! {
    static ref DISEASE_INFO: HashMap<&'static str, DiseaseRecord> = {
        let mut table = HashMap::new();
        table.insert(
            "Bacterial Blight",
            DiseaseRecord {
                severity: Severity::High,
                treatment: "Apply copper-based fungicides. Remove infected plants.",
            },
        );
        table.insert(
            "Curl Virus",
            DiseaseRecord {
                severity: Severity::High,
                treatment: "Control whitefly vectors. Remove infected plants immediately.",
            },
        );
        table.insert(
            "Healthy Leaf",
            DiseaseRecord {
                severity: Severity::None,
                treatment: "No treatment needed. Continue regular monitoring.",
            },
        );
        table.insert(
            "Herbicide Growth Damage",
            DiseaseRecord {
                severity: Severity::Medium,
                treatment: "Adjust herbicide application timing and dosage.",
            },
        );
        table.insert(
            "Leaf Hopper Jassids",
            DiseaseRecord {
                severity: Severity::Medium,
                treatment: "Apply neem-based insecticides. Monitor pest populations.",
            },
        );
        table.insert(
            "Leaf Redding",
            DiseaseRecord {
                severity: Severity::Low,
                treatment: "Improve soil nutrition. Check for mineral deficiencies.",
            },
        );
        table.insert(
            "Leaf Variegation",
            DiseaseRecord {
                severity: Severity::Low,
                treatment: "Monitor for underlying issues. Usually genetic.",
            },
        );
        table
    };
}

/// Curated advice for `label`, or the "consult an expert" record for labels
/// the table does not know.
pub fn lookup(label: &str) -> DiseaseRecord {
    DISEASE_INFO.get(label).copied().unwrap_or(FALLBACK)
}

pub fn labels() -> impl Iterator<Item = &'static str> {
    DISEASE_INFO.keys().copied()
}
