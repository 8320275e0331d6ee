// KwTheme - core/rules.rs
//
// Rule document parsing and compiled match predicates.
// Core layer: pure logic, no I/O.
//
// A rule document is line-oriented: one rule per non-blank line. Lines
// starting with `#` and markdown separators (`---`) are skipped. Each rule is
// decided once, at parse time, to be either a compiled regex or a literal
// substring; lines that do not compile as a regex degrade to literal matching
// and produce a `RuleParseWarning`.

use crate::core::model::normalize_keyword;
use crate::util::constants;
use crate::util::error::{RuleParseWarning, RuleWarningReason};
use regex::{Regex, RegexBuilder};

/// One compiled match predicate.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Case-insensitive substring, stored normalised.
    Literal(String),
    /// Case-insensitive regular expression.
    Regex(Regex),
}

impl Rule {
    /// Test a normalised keyword against this rule.
    pub fn matches(&self, normalized: &str) -> bool {
        match self {
            Rule::Literal(needle) => normalized.contains(needle.as_str()),
            Rule::Regex(re) => re.is_match(normalized),
        }
    }

    /// The pattern text, for diagnostics.
    pub fn pattern(&self) -> &str {
        match self {
            Rule::Literal(needle) => needle,
            Rule::Regex(re) => re.as_str(),
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, Rule::Regex(_))
    }
}

/// Ordered collection of rules parsed from one document.
///
/// Order only affects diagnostics; a keyword is kept when ANY rule matches.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    warnings: Vec<RuleParseWarning>,
}

impl RuleSet {
    /// Parse raw rule-document text. Never fails.
    pub fn parse(text: &str) -> Self {
        let mut rules = Vec::new();
        let mut warnings = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if is_skippable(line) {
                continue;
            }

            let (rule, warning) = compile_rule(idx + 1, line);
            if let Some(w) = warning {
                tracing::warn!(line = w.line, pattern = %w.pattern, "{w}");
                warnings.push(w);
            }
            rules.push(rule);
        }

        tracing::debug!(
            rules = rules.len(),
            regex = rules.iter().filter(|r| r.is_regex()).count(),
            degraded = warnings.len(),
            "Rule document parsed"
        );

        Self { rules, warnings }
    }

    /// True when `normalized` matches at least one rule.
    /// An empty set matches nothing.
    pub fn matches(&self, normalized: &str) -> bool {
        self.rules.iter().any(|r| r.matches(normalized))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Lines that were degraded to literal matching.
    pub fn warnings(&self) -> &[RuleParseWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Blank lines, comments, and markdown separators carry no rule.
fn is_skippable(line: &str) -> bool {
    line.is_empty()
        || line.starts_with(constants::RULE_COMMENT_MARKER)
        || line.starts_with(constants::RULE_SEPARATOR_MARKER)
}

/// Decide regex-or-literal for one trimmed line.
fn compile_rule(line_no: usize, line: &str) -> (Rule, Option<RuleParseWarning>) {
    let length = line.chars().count();
    if length > constants::MAX_REGEX_PATTERN_LENGTH {
        let warning = RuleParseWarning {
            line: line_no,
            pattern: line.to_string(),
            reason: RuleWarningReason::TooLong {
                length,
                max_length: constants::MAX_REGEX_PATTERN_LENGTH,
            },
        };
        return (Rule::Literal(normalize_keyword(line)), Some(warning));
    }

    match RegexBuilder::new(line)
        .case_insensitive(true)
        .size_limit(constants::REGEX_SIZE_LIMIT)
        .build()
    {
        Ok(re) => (Rule::Regex(re), None),
        Err(e) => {
            let warning = RuleParseWarning {
                line: line_no,
                pattern: line.to_string(),
                reason: RuleWarningReason::InvalidRegex {
                    message: e.to_string(),
                },
            };
            (Rule::Literal(normalize_keyword(line)), Some(warning))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_blank_comment_and_separator_lines() {
        let doc = "# keyword rules\n\nPPT\n---\n  template  \n#CRM\n";
        let set = RuleSet::parse(doc);
        assert_eq!(set.len(), 2);
        assert_eq!(set.rules()[0].pattern(), "PPT");
        assert_eq!(set.rules()[1].pattern(), "template");
        assert!(set.warnings().is_empty());
    }

    #[test]
    fn test_invalid_regex_degrades_to_literal_with_warning() {
        let set = RuleSet::parse("ok\n[invalid\n");
        assert_eq!(set.len(), 2);
        assert!(set.rules()[0].is_regex());
        assert!(!set.rules()[1].is_regex());

        let warnings = set.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].line, 2);
        assert_eq!(warnings[0].pattern, "[invalid");
        assert!(matches!(
            warnings[0].reason,
            RuleWarningReason::InvalidRegex { .. }
        ));

        // Literal match still works, case-insensitively.
        assert!(set.matches("buy [invalid widgets"));
        assert!(!set.matches("invalid"));
    }

    #[test]
    fn test_overlong_line_degrades_to_literal() {
        let long = "a".repeat(constants::MAX_REGEX_PATTERN_LENGTH + 1);
        let set = RuleSet::parse(&long);
        assert_eq!(set.len(), 1);
        assert!(!set.rules()[0].is_regex());
        assert!(matches!(
            set.warnings()[0].reason,
            RuleWarningReason::TooLong { .. }
        ));
    }

    #[test]
    fn test_regex_rules_are_case_insensitive() {
        let set = RuleSet::parse(r"^best\s+\w+ tool$");
        assert!(set.matches("best crm tool"));
        assert!(!set.matches("crm tool"));

        let upper = RuleSet::parse("CRM");
        assert!(upper.matches("best crm tool"));
    }

    #[test]
    fn test_any_rule_suffices() {
        let set = RuleSet::parse("PPT\ntemplate\nCRM");
        assert!(set.matches("ppt template free"));
        assert!(set.matches("best crm tool"));
        assert!(!set.matches("random unrelated term"));
    }

    #[test]
    fn test_empty_document_matches_nothing() {
        let set = RuleSet::parse("# only comments\n\n---\n");
        assert!(set.is_empty());
        assert!(!set.matches("anything"));
        assert!(!set.matches(""));
    }
}
