/// Placeholder values that must never be treated as real data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionRules {
    patterns: Vec<String>,
}

impl ExclusionRules {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// True when the value contains any pattern, ignoring case.
    pub fn is_excluded(&self, value: &str) -> bool {
        let value = value.trim().to_lowercase();
        !value.is_empty() && self.patterns.iter().any(|p| value.contains(p.as_str()))
    }

    /// A job-number cell value worth keeping: present and not a placeholder.
    pub fn usable_job<'a>(&self, value: Option<&'a str>) -> Option<&'a str> {
        value.filter(|v| !v.trim().is_empty() && !self.is_excluded(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ExclusionRules {
        ExclusionRules::new(["no match", "Not Assigned", "  "])
    }

    #[test]
    fn test_matches_substring_case_insensitively() {
        let rules = rules();
        assert!(rules.is_excluded("No Match - 004"));
        assert!(rules.is_excluded("NOT ASSIGNED"));
        assert!(!rules.is_excluded("WR-1001"));
        assert!(!rules.is_excluded(""));
    }

    #[test]
    fn test_blank_patterns_are_dropped() {
        let rules = rules();
        assert!(!rules.is_excluded("anything"));
    }

    #[test]
    fn test_usable_job() {
        let rules = rules();
        assert_eq!(rules.usable_job(Some("500-001")), Some("500-001"));
        assert_eq!(rules.usable_job(Some("no match")), None);
        assert_eq!(rules.usable_job(Some(" ")), None);
        assert_eq!(rules.usable_job(None), None);
    }
}
