//! Keyword-based content-safety scanner. Substring matching only; there is
//! no tokenization or classification here, the dictionary is the policy.

use quizguard_shared::domain::{AlertType, Severity, ThreatCategory};

use crate::storage::AlertSpec;

/// An active dictionary entry, parsed out of its storage row.
#[derive(Debug, Clone)]
pub struct ThreatEntry {
    pub keyword: String,
    pub severity: Severity,
    pub category: ThreatCategory,
}

/// One scan hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanMatch {
    pub keyword: String,
    pub severity: Severity,
    pub category: ThreatCategory,
}

/// Case-insensitive substring match against every entry, in dictionary
/// order. A single message may match multiple keywords.
pub fn scan(text: &str, entries: &[ThreatEntry]) -> Vec<ScanMatch> {
    let haystack = text.to_lowercase();
    entries
        .iter()
        .filter(|e| !e.keyword.is_empty() && haystack.contains(e.keyword.as_str()))
        .map(|e| ScanMatch {
            keyword: e.keyword.clone(),
            severity: e.severity,
            category: e.category,
        })
        .collect()
}

/// High > Medium > Low; `None` on empty input.
pub fn highest_severity(matches: &[ScanMatch]) -> Option<Severity> {
    matches.iter().map(|m| m.severity).max()
}

/// Build the alert for a non-empty set of scan matches: severity is the
/// highest across matches, type and trigger keyword come from the first.
pub fn alert_from_matches(child_display_name: &str, matches: &[ScanMatch]) -> Option<AlertSpec> {
    let severity = highest_severity(matches)?;
    let first = &matches[0];
    let alert_type = AlertType::from_category(first.category);
    let message = format!(
        "Chat message from {} was flagged ({} keyword \"{}\"{})",
        child_display_name,
        first.category.as_str(),
        first.keyword,
        if matches.len() > 1 {
            format!(" and {} more", matches.len() - 1)
        } else {
            String::new()
        },
    );
    Some(AlertSpec {
        severity,
        alert_type,
        message,
        trigger_keyword: Some(first.keyword.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(keyword: &str, severity: Severity, category: ThreatCategory) -> ThreatEntry {
        ThreatEntry {
            keyword: keyword.to_string(),
            severity,
            category,
        }
    }

    #[test]
    fn matches_single_keyword_case_insensitively() {
        let dict = vec![entry("stupid", Severity::Low, ThreatCategory::Cyberbullying)];
        let matches = scan("You are SO Stupid", &dict);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].keyword, "stupid");
        assert_eq!(matches[0].severity, Severity::Low);
        assert_eq!(matches[0].category, ThreatCategory::Cyberbullying);
        assert_eq!(highest_severity(&matches), Some(Severity::Low));
    }

    #[test]
    fn matches_multiple_keywords_in_dictionary_order() {
        let dict = vec![
            entry("idiot", Severity::Medium, ThreatCategory::Cyberbullying),
            entry("address", Severity::High, ThreatCategory::PersonalInfo),
            entry("loser", Severity::Low, ThreatCategory::Cyberbullying),
        ];
        let matches = scan("you loser, what is your address, idiot", &dict);
        let keywords: Vec<&str> = matches.iter().map(|m| m.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["idiot", "address", "loser"]);
        assert_eq!(highest_severity(&matches), Some(Severity::High));
    }

    #[test]
    fn clean_text_matches_nothing() {
        let dict = vec![entry("stupid", Severity::Low, ThreatCategory::Cyberbullying)];
        let matches = scan("great game, well played!", &dict);
        assert!(matches.is_empty());
        assert_eq!(highest_severity(&matches), None);
    }

    #[test]
    fn inactive_entries_are_not_the_scanners_concern() {
        // The store only hands the scanner active rows; an empty dictionary
        // scans clean.
        assert!(scan("anything at all", &[]).is_empty());
    }

    #[test]
    fn alert_derives_type_from_first_match_category() {
        let dict = vec![
            entry("secret", Severity::Low, ThreatCategory::PersonalInfo),
            entry("stupid", Severity::High, ThreatCategory::Cyberbullying),
        ];
        let matches = scan("keep it secret, stupid", &dict);
        let spec = alert_from_matches("Alice", &matches).expect("alert expected");
        // First match drives the type, highest severity wins overall.
        assert_eq!(spec.alert_type, AlertType::Other);
        assert_eq!(spec.severity, Severity::High);
        assert_eq!(spec.trigger_keyword.as_deref(), Some("secret"));
        assert!(spec.message.contains("Alice"));
    }

    #[test]
    fn bullying_and_explicit_categories_keep_their_own_alert_type() {
        let bully = vec![entry("stupid", Severity::Low, ThreatCategory::Cyberbullying)];
        let spec = alert_from_matches("Bob", &scan("stupid", &bully)).expect("alert");
        assert_eq!(spec.alert_type, AlertType::Cyberbullying);

        let explicit = vec![entry("xxx", Severity::High, ThreatCategory::ExplicitContent)];
        let spec = alert_from_matches("Bob", &scan("xxx", &explicit)).expect("alert");
        assert_eq!(spec.alert_type, AlertType::ExplicitContent);
    }

    #[test]
    fn no_alert_for_clean_scan() {
        assert!(alert_from_matches("Alice", &[]).is_none());
    }
}
