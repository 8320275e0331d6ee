// KwTheme - core/aggregate.rs
//
// Groups classified keywords by theme and computes per-theme statistics.
// Core layer: pure logic, no I/O.
//
// Group order is the first appearance of each theme among the classified
// keywords. Themes with no keywords produce no summary row. Volume sums
// include only records that carry a volume; counts include every record.

use crate::core::model::{Aggregation, ClassificationPath, ClassifiedKeyword, Theme, ThemeSummary};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Aggregate classified keywords into per-theme summaries.
///
/// `sample_size` caps the sample keywords kept per theme.
pub fn aggregate(classified: &[ClassifiedKeyword], sample_size: usize) -> Aggregation {
    let mut order: Vec<(Theme, Vec<usize>)> = Vec::new();
    let mut slot: HashMap<Theme, usize> = HashMap::new();

    for (idx, item) in classified.iter().enumerate() {
        let group = *slot.entry(item.theme).or_insert_with(|| {
            order.push((item.theme, Vec::new()));
            order.len() - 1
        });
        order[group].1.push(idx);
    }

    let mut summaries = Vec::with_capacity(order.len());
    let mut theme_counts = HashMap::with_capacity(order.len());
    let mut detail = Vec::with_capacity(classified.len());

    for (theme, mut members) in order {
        // Stable: equal volumes keep input order.
        members.sort_by(|&a, &b| {
            by_volume_desc(classified[a].record.volume, classified[b].record.volume)
        });

        let present: Vec<f64> = members
            .iter()
            .filter_map(|&i| classified[i].record.volume)
            .collect();

        summaries.push(ThemeSummary {
            theme,
            keyword_count: members.len(),
            total_volume: present.iter().sum(),
            volume_count: present.len(),
            sample_keywords: members
                .iter()
                .take(sample_size)
                .map(|&i| classified[i].record.text.clone())
                .collect(),
        });
        theme_counts.insert(theme, members.len());
        detail.extend(members.iter().map(|&i| classified[i].clone()));
    }

    tracing::debug!(
        themes = summaries.len(),
        keywords = classified.len(),
        "Aggregation complete"
    );

    Aggregation {
        summaries,
        theme_counts,
        detail,
    }
}

/// Volume descending, absent volumes last.
fn by_volume_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// How the classified keywords were labelled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathTally {
    pub remote: usize,
    pub local: usize,
    pub fallback: usize,
    /// Fallback count by reason label.
    pub reasons: BTreeMap<String, usize>,
}

pub fn tally_paths(classified: &[ClassifiedKeyword]) -> PathTally {
    let mut tally = PathTally::default();
    for item in classified {
        match item.path {
            ClassificationPath::Remote => tally.remote += 1,
            ClassificationPath::Local => tally.local += 1,
            ClassificationPath::Fallback(reason) => {
                tally.fallback += 1;
                *tally.reasons.entry(reason.label().to_string()).or_insert(0) += 1;
            }
        }
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{FallbackReason, KeywordRecord};

    fn item(text: &str, volume: Option<f64>, theme: Theme) -> ClassifiedKeyword {
        ClassifiedKeyword {
            record: KeywordRecord::new(text, volume, "test.csv").unwrap(),
            theme,
            path: ClassificationPath::Local,
        }
    }

    #[test]
    fn test_group_order_is_first_appearance() {
        let input = vec![
            item("a", None, Theme::Trend),
            item("b", None, Theme::TutorialGuide),
            item("c", None, Theme::Trend),
            item("d", None, Theme::Other),
        ];
        let agg = aggregate(&input, 5);
        let themes: Vec<Theme> = agg.summaries.iter().map(|s| s.theme).collect();
        // Neither alphabetical nor enumeration order.
        assert_eq!(themes, vec![Theme::Trend, Theme::TutorialGuide, Theme::Other]);
    }

    #[test]
    fn test_absent_themes_have_no_row_or_count() {
        let agg = aggregate(&[item("a", Some(1.0), Theme::Pricing)], 5);
        assert_eq!(agg.summaries.len(), 1);
        assert_eq!(agg.theme_counts.get(&Theme::Pricing), Some(&1));
        assert!(!agg.theme_counts.contains_key(&Theme::Other));
    }

    #[test]
    fn test_counts_sum_to_input_length() {
        let input = vec![
            item("a", Some(1.0), Theme::Trend),
            item("b", None, Theme::Trend),
            item("c", Some(3.0), Theme::Pricing),
        ];
        let agg = aggregate(&input, 1);
        assert_eq!(agg.theme_counts.values().sum::<usize>(), input.len());
        assert_eq!(agg.detail.len(), input.len());
    }

    #[test]
    fn test_volume_sums_only_present_values() {
        let input = vec![
            item("a", Some(100.0), Theme::Trend),
            item("b", None, Theme::Trend),
            item("c", Some(50.0), Theme::Trend),
        ];
        let s = &aggregate(&input, 5).summaries[0];
        assert_eq!(s.keyword_count, 3);
        assert_eq!(s.total_volume, 150.0);
        assert_eq!(s.volume_count, 2);
    }

    #[test]
    fn test_absent_volume_distinguishable_from_zero_sum() {
        let none = aggregate(&[item("a", None, Theme::Trend)], 5);
        let zero = aggregate(&[item("a", Some(0.0), Theme::Trend)], 5);
        assert_eq!(none.summaries[0].total_volume, 0.0);
        assert_eq!(zero.summaries[0].total_volume, 0.0);
        assert!(!none.summaries[0].has_volume());
        assert!(zero.summaries[0].has_volume());
    }

    #[test]
    fn test_samples_by_volume_desc_capped() {
        let input = vec![
            item("low", Some(1.0), Theme::Trend),
            item("none", None, Theme::Trend),
            item("high", Some(9.0), Theme::Trend),
            item("tie-first", Some(5.0), Theme::Trend),
            item("tie-second", Some(5.0), Theme::Trend),
        ];
        let agg = aggregate(&input, 4);
        assert_eq!(
            agg.summaries[0].sample_keywords,
            vec!["high", "tie-first", "tie-second", "low"]
        );
        assert_eq!(agg.detail.last().unwrap().record.text, "none");
        assert!(aggregate(&input, 0).summaries[0].sample_keywords.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let agg = aggregate(&[], 5);
        assert!(agg.summaries.is_empty());
        assert!(agg.theme_counts.is_empty());
    }

    #[test]
    fn test_tally_paths() {
        let mut a = item("a", None, Theme::Other);
        a.path = ClassificationPath::Remote;
        let mut b = item("b", None, Theme::Other);
        b.path = ClassificationPath::Fallback(FallbackReason::Timeout);
        let mut c = item("c", None, Theme::Other);
        c.path = ClassificationPath::Fallback(FallbackReason::Timeout);
        let d = item("d", None, Theme::Other);

        let tally = tally_paths(&[a, b, c, d]);
        assert_eq!(tally.remote, 1);
        assert_eq!(tally.local, 1);
        assert_eq!(tally.fallback, 2);
        assert_eq!(tally.reasons.get("timeout"), Some(&2));
    }
}
