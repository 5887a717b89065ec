//! Safety-keyword detection on finalized transcripts.

use std::collections::BTreeSet;

/// French distress vocabulary checked against every final transcript.
const EMERGENCY_KEYWORDS: &[&str] = &[
    "aide",
    "aidez",
    "urgence",
    "urgent",
    "mal",
    "douleur",
    "secours",
    "appel",
    "ambulance",
    "docteur",
    "médecin",
    "pompiers",
    "police",
    "danger",
    "feu",
    "incendie",
    "tombé",
    "tombée",
    "chute",
    "tombe",
];

/// Case-insensitive whole-word matcher for the safety vocabulary.
///
/// Word boundaries are any non-alphanumeric character, so elided forms like
/// "d'aide" still match "aide".
#[derive(Debug, Clone, Copy, Default)]
pub struct EmergencyDetector;

impl EmergencyDetector {
    pub fn new() -> Self {
        Self
    }

    /// True when the text contains at least one safety keyword.
    pub fn check(&self, text: &str) -> bool {
        !self.matched_words(text).is_empty()
    }

    /// The distinct safety keywords present in the text.
    pub fn matched_words(&self, text: &str) -> BTreeSet<String> {
        let mut matched = BTreeSet::new();
        if text.is_empty() {
            return matched;
        }

        let lower = text.to_lowercase();
        for word in lower.split(|c: char| !c.is_alphanumeric()) {
            if !word.is_empty() && EMERGENCY_KEYWORDS.contains(&word) {
                matched.insert(word.to_string());
            }
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_keyword_after_elision() {
        let detector = EmergencyDetector::new();

        assert!(detector.check("j'ai besoin d'aide"));
        let words = detector.matched_words("j'ai besoin d'aide");
        assert!(words.contains("aide"));
        assert_eq!(words.len(), 1);
    }

    #[test]
    fn test_benign_text_matches_nothing() {
        let detector = EmergencyDetector::new();

        assert!(!detector.check("il fait beau aujourd'hui"));
        assert!(detector.matched_words("il fait beau aujourd'hui").is_empty());
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let detector = EmergencyDetector::new();

        assert!(detector.check("URGENCE appelez le docteur"));
        let words = detector.matched_words("URGENCE appelez le Docteur");
        assert!(words.contains("urgence"));
        assert!(words.contains("docteur"));
    }

    #[test]
    fn test_accented_keywords_match() {
        let detector = EmergencyDetector::new();

        assert!(detector.check("elle est tombée dans la cuisine"));
        assert!(detector.matched_words("le médecin arrive").contains("médecin"));
    }

    #[test]
    fn test_substring_is_not_a_whole_word() {
        let detector = EmergencyDetector::new();

        // "malheureusement" contains "mal" but is not the word "mal".
        assert!(!detector.check("malheureusement il pleut"));
    }

    #[test]
    fn test_repeated_keyword_collapses_to_one() {
        let detector = EmergencyDetector::new();

        let words = detector.matched_words("aide aide aide");
        assert_eq!(words.len(), 1);
        assert!(words.contains("aide"));
    }

    #[test]
    fn test_empty_text() {
        let detector = EmergencyDetector::new();

        assert!(!detector.check(""));
        assert!(detector.matched_words("").is_empty());
    }

    #[test]
    fn test_multiple_distinct_keywords() {
        let detector = EmergencyDetector::new();

        let words = detector.matched_words("au secours j'ai mal appelez une ambulance");
        assert!(words.contains("secours"));
        assert!(words.contains("mal"));
        assert!(words.contains("ambulance"));
        assert_eq!(words.len(), 3);
    }
}
