// KwTheme - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Config validation clamps user values against the bounds declared here.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "KwTheme";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "KwTheme";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Input tables
// =============================================================================

/// Header aliases accepted for the keyword column, in priority order.
/// Matching is case-insensitive and ignores surrounding whitespace.
pub const DEFAULT_KEYWORD_ALIASES: &[&str] = &[
    "keyword",
    "keywords",
    "query",
    "search term",
    "搜索词",
    "关键词",
];

/// Header aliases accepted for the optional search-volume column.
pub const DEFAULT_VOLUME_ALIASES: &[&str] = &[
    "volume",
    "search volume",
    "searches",
    "搜索量",
    "月搜索量",
];

/// Glob patterns for input tables discovered inside an input directory.
pub const INPUT_TABLE_PATTERNS: &[&str] = &["*.csv", "*.tsv"];

/// Filename prefix of spreadsheet lock files that must never be read as input.
pub const LOCK_FILE_PREFIX: &str = "~$";

/// Maximum size of a single input table in bytes.
pub const MAX_INPUT_FILE_SIZE: u64 = 256 * 1024 * 1024; // 256 MB

/// Maximum number of input tables accepted for one run.
pub const MAX_INPUT_TABLES: usize = 500;

// =============================================================================
// Rule documents
// =============================================================================

/// Lines starting with this marker are comments.
pub const RULE_COMMENT_MARKER: &str = "#";

/// Markdown horizontal rules are tolerated in rule documents and skipped.
pub const RULE_SEPARATOR_MARKER: &str = "---";

/// Maximum regex pattern length to prevent ReDoS. Longer lines degrade to
/// literal matching.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

/// Compiled-program size limit handed to the regex builder (bytes).
pub const REGEX_SIZE_LIMIT: usize = 1024 * 1024;

/// Default rule document file name inside the data directory.
pub const RULES_FILE_NAME: &str = "keywords.md";

// =============================================================================
// Classification
// =============================================================================

/// Default remote endpoint (OpenAI-compatible chat completions).
pub const DEFAULT_ENDPOINT: &str = "https://api.deepseek.com/v1/chat/completions";

/// Default remote model identifier.
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Default maximum output tokens requested from the remote model.
/// A theme label is a handful of tokens; 50 leaves room for quoting.
pub const DEFAULT_MAX_TOKENS: u32 = 50;

/// Upper bound on configurable max output tokens.
pub const ABSOLUTE_MAX_TOKENS: u32 = 4_096;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Allowed temperature range.
pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Default per-call timeout for remote classification (seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Allowed per-call timeout range (seconds).
pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_TIMEOUT_SECS: u64 = 600;

/// Connect timeout used by the HTTP client, capped by the per-call timeout.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Retries after a transient remote failure. 0 = a single attempt.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 0;

/// Hard upper bound on retries per keyword.
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Base delay between retries (milliseconds); doubled on each further retry.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;

/// Upper bound on the configurable base retry delay (milliseconds).
pub const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// Maximum bytes of a non-2xx response body kept for diagnostics.
pub const MAX_ERROR_BODY_PREVIEW: usize = 512;

/// Default number of classification worker threads.
/// Remote calls are I/O bound, so this is deliberately above core count.
pub const DEFAULT_WORKER_THREADS: usize = 8;

/// Hard upper bound on classification worker threads.
pub const MAX_WORKER_THREADS: usize = 64;

/// Keywords classified between INFO progress log lines.
pub const PROGRESS_LOG_INTERVAL: usize = 50;

// =============================================================================
// Report
// =============================================================================

/// Default report filename prefix.
pub const DEFAULT_OUTPUT_PREFIX: &str = "keyword_analysis";

/// Maximum characters kept from a user-supplied output prefix.
pub const MAX_OUTPUT_PREFIX_LENGTH: usize = 100;

/// Timestamp format appended to report filenames.
pub const REPORT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Suffix appended to the detail table filename (before the extension).
pub const DETAIL_FILE_SUFFIX: &str = "keywords";

/// Report file extension.
pub const REPORT_EXTENSION: &str = "csv";

/// Separator between sample keywords inside a single report cell.
pub const SAMPLE_SEPARATOR: &str = "; ";

/// Default number of sample keywords kept per theme.
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

/// Upper bound on the configurable sample size.
pub const MAX_SAMPLE_SIZE: usize = 100;

/// Maximum attempts at finding a free report filename within one second.
pub const MAX_REPORT_NAME_ATTEMPTS: usize = 100;

/// Default results subdirectory name inside the data directory.
pub const RESULTS_DIR_NAME: &str = "results";

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Characters of an endpoint URL included in log output.
pub const LOG_ENDPOINT_PREVIEW: usize = 40;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Prefix shared by all environment overrides.
pub const ENV_PREFIX: &str = "KWTHEME_";
