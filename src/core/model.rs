// KwTheme - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no
// platform dependencies.
//
// These types are the shared vocabulary across all layers.

use crate::util::error::RuleParseWarning;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

// =============================================================================
// Keyword Record (output of extraction)
// =============================================================================

/// One candidate keyword, deduplicated across all input tables.
///
/// Identity is the normalised text (see [`normalize_keyword`]); the record
/// keeps the trimmed text of the first occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordRecord {
    /// Trimmed keyword text as first seen. Never empty.
    pub text: String,

    /// Lower-cased, whitespace-collapsed text used for identity and matching.
    pub normalized: String,

    /// Search volume. `None` when the table has no volume column or the cell
    /// was blank/invalid. Never defaulted to zero.
    pub volume: Option<f64>,

    /// Name of the input table the record first appeared in.
    pub source: String,
}

impl KeywordRecord {
    /// Build a record from raw cell text. Returns `None` for blank text.
    pub fn new(text: &str, volume: Option<f64>, source: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            text: trimmed.to_string(),
            normalized: normalize_keyword(trimmed),
            volume,
            source: source.to_string(),
        })
    }
}

/// Normalise keyword text: lower-case and collapse internal whitespace runs
/// to a single space. Leading/trailing whitespace is removed.
pub fn normalize_keyword(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Theme
// =============================================================================

/// The fixed, closed set of topical themes a keyword can be assigned.
///
/// Variant order is the enumeration order offered to the remote model and
/// the priority order of the local cue table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum Theme {
    #[serde(rename = "tutorial/guide")]
    TutorialGuide,
    #[serde(rename = "tool/software")]
    ToolSoftware,
    #[serde(rename = "template/resource")]
    TemplateResource,
    #[serde(rename = "free-resource")]
    FreeResource,
    #[serde(rename = "pricing")]
    Pricing,
    #[serde(rename = "comparison/review")]
    ComparisonReview,
    #[serde(rename = "troubleshooting")]
    Troubleshooting,
    #[serde(rename = "trend")]
    Trend,
    #[serde(rename = "fundamentals")]
    Fundamentals,
    #[serde(rename = "advanced-tips")]
    AdvancedTips,
    #[serde(rename = "best-practices")]
    BestPractices,
    #[serde(rename = "industry-application")]
    IndustryApplication,
    #[serde(rename = "product-recommendation")]
    ProductRecommendation,
    #[serde(rename = "case-study")]
    CaseStudy,
    #[serde(rename = "learning-resource")]
    LearningResource,
    #[serde(rename = "other")]
    #[default]
    Other,
}

impl Theme {
    /// All 16 themes in enumeration order.
    pub const ALL: [Theme; 16] = [
        Theme::TutorialGuide,
        Theme::ToolSoftware,
        Theme::TemplateResource,
        Theme::FreeResource,
        Theme::Pricing,
        Theme::ComparisonReview,
        Theme::Troubleshooting,
        Theme::Trend,
        Theme::Fundamentals,
        Theme::AdvancedTips,
        Theme::BestPractices,
        Theme::IndustryApplication,
        Theme::ProductRecommendation,
        Theme::CaseStudy,
        Theme::LearningResource,
        Theme::Other,
    ];

    /// Canonical label, as written in reports and sent to the remote model.
    pub fn label(&self) -> &'static str {
        match self {
            Theme::TutorialGuide => "tutorial/guide",
            Theme::ToolSoftware => "tool/software",
            Theme::TemplateResource => "template/resource",
            Theme::FreeResource => "free-resource",
            Theme::Pricing => "pricing",
            Theme::ComparisonReview => "comparison/review",
            Theme::Troubleshooting => "troubleshooting",
            Theme::Trend => "trend",
            Theme::Fundamentals => "fundamentals",
            Theme::AdvancedTips => "advanced-tips",
            Theme::BestPractices => "best-practices",
            Theme::IndustryApplication => "industry-application",
            Theme::ProductRecommendation => "product-recommendation",
            Theme::CaseStudy => "case-study",
            Theme::LearningResource => "learning-resource",
            Theme::Other => "other",
        }
    }

    /// Resolve a label to a theme.
    ///
    /// Case-insensitive. Separator variants are tolerated, so
    /// `"Tool/Software"`, `"tool_software"`, `"tool software"` and
    /// `"tool-software"` all resolve to [`Theme::ToolSoftware`].
    pub fn from_label(label: &str) -> Option<Theme> {
        let key = label_key(label);
        if key.is_empty() {
            return None;
        }
        Theme::ALL
            .iter()
            .copied()
            .find(|theme| label_key(theme.label()) == key)
    }
}

/// Reduce a label to lower-case alphanumerics joined by single spaces.
fn label_key(label: &str) -> String {
    label
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Why a keyword fell back from the remote strategy to the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Endpoint could not be reached.
    Unreachable,
    /// Per-call timeout exceeded.
    Timeout,
    /// Non-2xx HTTP status.
    HttpStatus,
    /// Body could not be decoded or carried no label.
    Malformed,
    /// Label was not one of the fixed themes.
    UnknownLabel,
    /// Run was cancelled before the remote call was issued.
    Cancelled,
}

impl FallbackReason {
    /// Stable snake_case label used as a tally key.
    pub fn label(&self) -> &'static str {
        match self {
            FallbackReason::Unreachable => "unreachable",
            FallbackReason::Timeout => "timeout",
            FallbackReason::HttpStatus => "http_status",
            FallbackReason::Malformed => "malformed",
            FallbackReason::UnknownLabel => "unknown_label",
            FallbackReason::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Which strategy produced a keyword's theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", content = "reason", rename_all = "snake_case")]
pub enum ClassificationPath {
    /// The remote model returned a valid label.
    Remote,
    /// No remote strategy was configured; local rules were used directly.
    Local,
    /// The remote strategy failed for this keyword; local rules were used.
    Fallback(FallbackReason),
}

/// A keyword record with its assigned theme.
///
/// Every filtered record becomes exactly one `ClassifiedKeyword`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedKeyword {
    pub record: KeywordRecord,
    pub theme: Theme,
    pub path: ClassificationPath,
}

// =============================================================================
// Aggregation output
// =============================================================================

/// Per-theme aggregate row forming the report body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThemeSummary {
    pub theme: Theme,

    /// Number of keywords assigned this theme. Always > 0 in a report.
    pub keyword_count: usize,

    /// Sum of the volumes that were present. 0 when none were.
    pub total_volume: f64,

    /// How many of the theme's keywords carried a volume. Distinguishes
    /// "no volumes reported" (0) from "volumes summed to zero" (> 0).
    pub volume_count: usize,

    /// Highest-volume keywords first, capped at the configured sample size.
    pub sample_keywords: Vec<String>,
}

impl ThemeSummary {
    /// True when at least one keyword in the theme carried a volume.
    pub fn has_volume(&self) -> bool {
        self.volume_count > 0
    }
}

/// Output of the aggregator, before the report is persisted.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// One entry per theme present, in first-appearance order.
    pub summaries: Vec<ThemeSummary>,

    /// Keyword count per theme present. Absent themes have no key.
    pub theme_counts: HashMap<Theme, usize>,

    /// Classified keywords regrouped in summary order, volume descending.
    pub detail: Vec<ClassifiedKeyword>,
}

// =============================================================================
// Analysis result
// =============================================================================

/// The run's final artifact, returned to the caller and not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    /// Path of the per-theme summary report.
    pub output_location: PathBuf,

    /// Path of the companion per-keyword detail table.
    pub detail_location: Option<PathBuf>,

    /// Deduplicated keywords extracted from all inputs.
    pub total_keywords: usize,

    /// Keywords that matched at least one rule.
    pub filtered_keywords: usize,

    /// Keyword count per theme present.
    pub theme_counts: HashMap<Theme, usize>,

    /// Per-theme rows in report order.
    pub summaries: Vec<ThemeSummary>,

    /// Keywords labelled by the remote model.
    pub remote_classified: usize,

    /// Keywords labelled locally because no remote strategy was configured.
    pub local_classified: usize,

    /// Keywords that fell back from remote to local.
    pub fallback_count: usize,

    /// Fallback tally by reason label.
    pub fallback_reasons: BTreeMap<String, usize>,

    /// Rule lines that degraded to literal matching.
    pub rule_warnings: Vec<RuleParseWarning>,

    /// Filtered keywords that carried a volume.
    pub volumes_reported: usize,

    /// True when cancellation made at least one keyword skip the remote
    /// strategy. Those keywords were classified locally and the report is
    /// still complete.
    pub cancelled: bool,

    /// Wall-clock duration of the run in milliseconds.
    pub duration_ms: u64,
}

// =============================================================================
// Extraction statistics
// =============================================================================

/// Per-table extraction statistics, logged and returned for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Table name (file name for on-disk tables).
    pub source: String,

    /// Header that was resolved as the keyword column.
    pub keyword_column: String,

    /// Header resolved as the volume column, if any.
    pub volume_column: Option<String>,

    /// Data rows read (excluding the header).
    pub rows_read: usize,

    /// Rows dropped because the keyword cell was blank.
    pub blank_rows: usize,

    /// Rows merged into an earlier record with the same identity.
    pub duplicates_merged: usize,

    /// Volume cells present but not a finite, non-negative number.
    pub invalid_volumes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_case_and_whitespace() {
        assert_eq!(normalize_keyword("  Best   CRM\tTool "), "best crm tool");
        assert_eq!(normalize_keyword("PPT template"), normalize_keyword("ppt  TEMPLATE"));
    }

    #[test]
    fn test_record_rejects_blank_text() {
        assert!(KeywordRecord::new("   ", Some(1.0), "a.csv").is_none());
        let rec = KeywordRecord::new("  Free Icons ", None, "a.csv").unwrap();
        assert_eq!(rec.text, "Free Icons");
        assert_eq!(rec.normalized, "free icons");
        assert_eq!(rec.volume, None);
    }

    #[test]
    fn test_theme_enumeration_is_complete() {
        assert_eq!(Theme::ALL.len(), 16);
        assert_eq!(Theme::default(), Theme::Other);
        for theme in Theme::ALL {
            assert_eq!(Theme::from_label(theme.label()), Some(theme));
        }
    }

    #[test]
    fn test_theme_from_label_tolerates_separators() {
        assert_eq!(Theme::from_label("Tool/Software"), Some(Theme::ToolSoftware));
        assert_eq!(Theme::from_label("tool_software"), Some(Theme::ToolSoftware));
        assert_eq!(Theme::from_label("free resource"), Some(Theme::FreeResource));
        assert_eq!(Theme::from_label(" CASE-STUDY "), Some(Theme::CaseStudy));
        assert_eq!(Theme::from_label("sports"), None);
        assert_eq!(Theme::from_label(""), None);
        assert_eq!(Theme::from_label("//"), None);
    }

    #[test]
    fn test_theme_serialises_as_label() {
        let json = serde_json::to_string(&Theme::TemplateResource).unwrap();
        assert_eq!(json, "\"template/resource\"");
    }
}
