// KwTheme - core/classify.rs
//
// Theme classification: the `Classifier` capability, the local cue-table
// strategy, and the fallback chain that composes a remote strategy with it.
// Core layer: no I/O here; the remote strategy lives in core::remote.
//
// Per keyword: Pending -> remote attempted -> (succeeded | failed -> local)
// -> Classified. No keyword leaves `FallbackChain::classify` without a theme.

use crate::core::model::{
    normalize_keyword, ClassificationPath, ClassifiedKeyword, FallbackReason, KeywordRecord, Theme,
};
use crate::util::error::RemoteError;
use regex::Regex;
use std::sync::OnceLock;

/// A strategy that assigns one theme to one keyword.
///
/// Implementations must be safe to call concurrently from worker threads and
/// must not share per-call mutable state.
pub trait Classifier: Send + Sync {
    /// Short strategy name for logs.
    fn name(&self) -> &'static str;

    fn classify(&self, record: &KeywordRecord) -> Result<Theme, RemoteError>;
}

// =============================================================================
// Local cue table
// =============================================================================

/// Priority-ordered cues per theme. The first theme with a matching cue wins.
///
/// ASCII cues are regex fragments matched on word boundaries; CJK cues are
/// matched as plain substrings since CJK text has no word separators.
const CUE_TABLE: &[(Theme, &[&str])] = &[
    (
        Theme::TutorialGuide,
        &[
            "how to",
            "tutorials?",
            "guides?",
            "step by step",
            "walkthrough",
            "教程",
            "如何",
            "怎么",
            "指南",
        ],
    ),
    (
        Theme::ToolSoftware,
        &[
            "tools?",
            "software",
            "apps?",
            "plugins?",
            "extensions?",
            "generators?",
            "makers?",
            "editors?",
            "工具",
            "软件",
            "插件",
        ],
    ),
    (
        Theme::TemplateResource,
        &["templates?", "samples?", "examples?", "downloads?", "mockups?", "模板", "素材", "范文"],
    ),
    (Theme::FreeResource, &["free", "免费"]),
    (
        Theme::Pricing,
        &[
            "prices?",
            "pricing",
            "costs?",
            "cheap",
            "how much",
            "subscriptions?",
            "价格",
            "多少钱",
            "费用",
        ],
    ),
    (
        Theme::ComparisonReview,
        &[
            "vs",
            "versus",
            "compare",
            "comparison",
            "reviews?",
            "alternatives?",
            "比较",
            "对比",
            "评测",
            "测评",
        ],
    ),
    (
        Theme::Troubleshooting,
        &[
            "errors?",
            "not working",
            "fix",
            "issues?",
            "problems?",
            "troubleshoot(?:ing)?",
            "fail(?:ed|ing)?",
            "报错",
            "失败",
            "解决",
        ],
    ),
    (Theme::Trend, &["trends?", "trending", "latest", "future", r"20[2-3]\d", "趋势", "最新"]),
    (
        Theme::Fundamentals,
        &[
            "what is",
            "meaning",
            "definition",
            "basics?",
            "introduction",
            "beginners?",
            "是什么",
            "入门",
            "基础",
        ],
    ),
    (
        Theme::AdvancedTips,
        &["advanced", "tips", "tricks", "hacks?", "shortcuts?", "技巧", "进阶", "高级"],
    ),
    (
        Theme::BestPractices,
        &["best practices?", "checklist", "strateg(?:y|ies)", "optimi[sz]e", "最佳实践", "策略"],
    ),
    (
        Theme::IndustryApplication,
        &[
            "industry",
            "enterprise",
            "for business",
            "ecommerce",
            "healthcare",
            "real estate",
            "行业",
            "企业",
        ],
    ),
    (
        Theme::ProductRecommendation,
        &["best", "top", "recommend(?:ed|ation|ations)?", "buy", "推荐", "排行"],
    ),
    (Theme::CaseStudy, &["case stud(?:y|ies)", "success stor(?:y|ies)", "showcase", "案例"]),
    (
        Theme::LearningResource,
        &[
            "courses?",
            "books?",
            "learn(?:ing)?",
            "class(?:es)?",
            "certification",
            "training",
            "课程",
            "学习",
            "培训",
        ],
    ),
];

/// Compile one theme's cues into a single alternation.
fn compile_cues(cues: &[&str]) -> Result<Regex, regex::Error> {
    let alternatives: Vec<String> = cues
        .iter()
        .map(|cue| {
            if cue.is_ascii() {
                format!(r"\b(?:{cue})\b")
            } else {
                regex::escape(cue)
            }
        })
        .collect();
    Regex::new(&format!("(?i){}", alternatives.join("|")))
}

fn cue_table() -> &'static [(Theme, Regex)] {
    static TABLE: OnceLock<Vec<(Theme, Regex)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        CUE_TABLE
            .iter()
            .filter_map(|(theme, cues)| match compile_cues(cues) {
                Ok(re) => Some((*theme, re)),
                Err(e) => {
                    tracing::error!(
                        theme = %theme,
                        error = %e,
                        "Invalid cue pattern; theme disabled"
                    );
                    None
                }
            })
            .collect()
    })
}

/// Classify text with the local cue table. Pure and deterministic.
pub fn classify_local(text: &str) -> Theme {
    let normalized = normalize_keyword(text);
    cue_table()
        .iter()
        .find(|(_, re)| re.is_match(&normalized))
        .map(|(theme, _)| *theme)
        .unwrap_or(Theme::Other)
}

/// Network-free strategy backed by [`classify_local`]. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRuleClassifier;

impl Classifier for LocalRuleClassifier {
    fn name(&self) -> &'static str {
        "local"
    }

    fn classify(&self, record: &KeywordRecord) -> Result<Theme, RemoteError> {
        Ok(classify_local(&record.normalized))
    }
}

// =============================================================================
// Fallback chain
// =============================================================================

/// Map a remote failure to the reason tallied in the run summary.
pub fn fallback_reason(err: &RemoteError) -> FallbackReason {
    match err {
        RemoteError::Timeout { .. } => FallbackReason::Timeout,
        RemoteError::Status { .. } => FallbackReason::HttpStatus,
        RemoteError::Malformed(_) => FallbackReason::Malformed,
        RemoteError::UnknownLabel(_) => FallbackReason::UnknownLabel,
        RemoteError::Unreachable { .. } | RemoteError::Http(_) | RemoteError::ClientBuild(_) => {
            FallbackReason::Unreachable
        }
    }
}

/// Optional primary strategy with the local strategy behind it.
pub struct FallbackChain {
    primary: Option<Box<dyn Classifier>>,
    fallback: LocalRuleClassifier,
}

impl FallbackChain {
    /// Local classification only; every keyword is reported as `Local`.
    pub fn local_only() -> Self {
        Self {
            primary: None,
            fallback: LocalRuleClassifier,
        }
    }

    pub fn with_primary(primary: Box<dyn Classifier>) -> Self {
        Self {
            primary: Some(primary),
            fallback: LocalRuleClassifier,
        }
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// Classify one keyword. Always returns a theme.
    ///
    /// When `cancelled` is set the primary strategy is not called and the
    /// keyword is classified locally with reason `Cancelled`.
    pub fn classify(&self, record: &KeywordRecord, cancelled: bool) -> ClassifiedKeyword {
        let path = match &self.primary {
            None => ClassificationPath::Local,
            Some(_) if cancelled => ClassificationPath::Fallback(FallbackReason::Cancelled),
            Some(primary) => match primary.classify(record) {
                Ok(theme) => {
                    return ClassifiedKeyword {
                        record: record.clone(),
                        theme,
                        path: ClassificationPath::Remote,
                    };
                }
                Err(e) => {
                    let reason = fallback_reason(&e);
                    tracing::debug!(
                        keyword = %record.text,
                        strategy = primary.name(),
                        reason = %reason,
                        error = %e,
                        "Remote classification failed; using local rules"
                    );
                    ClassificationPath::Fallback(reason)
                }
            },
        };

        let theme = self
            .fallback
            .classify(record)
            .unwrap_or(Theme::Other);
        ClassifiedKeyword {
            record: record.clone(),
            theme,
            path,
        }
    }
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("primary", &self.primary.as_ref().map(|p| p.name()))
            .field("fallback", &self.fallback.name())
            .finish()
    }
}
