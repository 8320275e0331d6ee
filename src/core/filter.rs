// KwTheme - core/filter.rs
//
// Filter engine: keeps the keywords that match at least one rule.
// Core layer: pure logic, no I/O.
//
// Fail-closed: an empty RuleSet keeps nothing, so a missing or empty rule
// document never sends the whole input to classification.

use crate::core::model::KeywordRecord;
use crate::core::rules::RuleSet;

/// Return indices of the records that match any rule, in input order.
///
/// Indices avoid copying records when the caller only needs a view.
pub fn apply_rules(records: &[KeywordRecord], rules: &RuleSet) -> Vec<usize> {
    if rules.is_empty() {
        if !records.is_empty() {
            tracing::warn!(
                candidates = records.len(),
                "Rule set is empty; no keywords pass the filter"
            );
        }
        return Vec::new();
    }

    records
        .iter()
        .enumerate()
        .filter(|(_, record)| rules.matches(&record.normalized))
        .map(|(idx, _)| idx)
        .collect()
}

/// Owned variant of [`apply_rules`]: the surviving records, in input order.
pub fn filter_records(records: &[KeywordRecord], rules: &RuleSet) -> Vec<KeywordRecord> {
    let kept: Vec<KeywordRecord> = apply_rules(records, rules)
        .into_iter()
        .map(|idx| records[idx].clone())
        .collect();

    tracing::info!(
        candidates = records.len(),
        kept = kept.len(),
        rules = rules.len(),
        "Keywords filtered"
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(texts: &[&str]) -> Vec<KeywordRecord> {
        texts
            .iter()
            .filter_map(|t| KeywordRecord::new(t, None, "test.csv"))
            .collect()
    }

    #[test]
    fn test_empty_rule_set_keeps_nothing() {
        let input = records(&["ppt template", "crm"]);
        assert!(apply_rules(&input, &RuleSet::parse("")).is_empty());
        assert!(filter_records(&input, &RuleSet::parse("# none\n")).is_empty());
    }

    #[test]
    fn test_matches_case_insensitively_on_normalised_text() {
        let input = records(&["PPT  Template Free", "Best CRM Tool", "random unrelated term"]);
        let kept = apply_rules(&input, &RuleSet::parse("ppt template\nCrm"));
        assert_eq!(kept, vec![0, 1]);
    }

    #[test]
    fn test_output_preserves_input_order() {
        let input = records(&["zeta crm", "alpha", "beta crm", "gamma ppt"]);
        let kept = filter_records(&input, &RuleSet::parse("ppt\ncrm"));
        let texts: Vec<_> = kept.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["zeta crm", "beta crm", "gamma ppt"]);
    }

    #[test]
    fn test_never_grows_the_input() {
        let input = records(&["a", "ab", "abc"]);
        let kept = apply_rules(&input, &RuleSet::parse("a\nab\nabc\n.*"));
        assert_eq!(kept.len(), input.len());
    }
}
