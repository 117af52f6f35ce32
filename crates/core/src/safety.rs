use regex::RegexSet;

/// Queries asking for diagnosis, medication, dosage, prescriptions, or
/// high-risk pregnancy guidance are refused without calling any provider.
const UNSAFE_PATTERNS: &[&str] = &[
    r"(?i)diagnos(e|is)",
    r"(?i)penyakit",
    r"(?i)obat",
    r"(?i)dosis",
    r"(?i)dosage",
    r"(?i)terapi",
    r"(?i)resep dokter",
    r"(?i)hamil berisiko",
];

pub const REFUSAL_MESSAGE: &str =
    "Maaf, saya tidak dapat memberikan rekomendasi medis. Konsultasikan dengan tenaga kesehatan profesional.";

pub const REFUSAL_REASON_MEDICAL: &str = "medical_request";

pub struct SafetyScreen {
    patterns: RegexSet,
}

impl SafetyScreen {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            patterns: RegexSet::new(UNSAFE_PATTERNS)?,
        })
    }

    pub fn is_unsafe(&self, text: &str) -> bool {
        self.patterns.is_match(text)
    }
}

/// Keyword classifier separating diet questions from chit-chat. First
/// match wins; unmatched questions get the generic friendly prompt.
const DIET_KEYWORDS: &[&str] = &[
    "diet",
    "nutrition",
    "gizi",
    "kalori",
    "protein",
    "lemak",
    "karbohidrat",
    "vitamin",
    "mineral",
    "berat",
    "weight",
    "bmi",
    "makan",
    "menu",
    "makanan",
    "porsi",
    "olahraga",
];

pub fn is_diet_related(text: &str) -> bool {
    let lower = text.to_lowercase();
    DIET_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> SafetyScreen {
        SafetyScreen::new().expect("patterns compile")
    }

    #[test]
    fn dosage_queries_are_unsafe() {
        assert!(screen().is_unsafe("what dosage of vitamin D should I take"));
        assert!(screen().is_unsafe("berapa dosis obat ini"));
    }

    #[test]
    fn diagnosis_queries_are_unsafe() {
        assert!(screen().is_unsafe("can you diagnose my fatigue"));
        assert!(screen().is_unsafe("apakah saya punya penyakit gula"));
    }

    #[test]
    fn plain_nutrition_queries_are_safe() {
        assert!(!screen().is_unsafe("how much protein does an egg have"));
        assert!(!screen().is_unsafe("kebutuhan kalori harian"));
    }

    #[test]
    fn diet_classifier_matches_keywords() {
        assert!(is_diet_related("how many kalori in a banana"));
        assert!(is_diet_related("What is a good DIET plan?"));
        assert!(!is_diet_related("hello there, how are you"));
    }
}
