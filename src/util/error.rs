// KwTheme - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation between subsystems.
// All errors preserve the causal chain for diagnostic logging.

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all KwTheme operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum KwThemeError {
    /// An input table does not have the required shape.
    Schema(SchemaError),

    /// An input table or rule document could not be read.
    Input(InputError),

    /// The remote classifier could not be constructed.
    Remote(RemoteError),

    /// Writing the report failed; no report was left behind.
    Report(ReportWriteError),

    /// Saving or clearing a persisted rule document failed.
    RulesStore(RulesStoreError),

    /// Configuration loading or validation failed.
    Config(ConfigError),
}

impl fmt::Display for KwThemeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema(e) => write!(f, "Schema error: {e}"),
            Self::Input(e) => write!(f, "Input error: {e}"),
            Self::Remote(e) => write!(f, "Remote classifier error: {e}"),
            Self::Report(e) => write!(f, "Report error: {e}"),
            Self::RulesStore(e) => write!(f, "Rule store error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
        }
    }
}

impl std::error::Error for KwThemeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Schema(e) => Some(e),
            Self::Input(e) => Some(e),
            Self::Remote(e) => Some(e),
            Self::Report(e) => Some(e),
            Self::RulesStore(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Schema errors
// ---------------------------------------------------------------------------

/// Input table does not carry the columns the extractor needs.
#[derive(Debug)]
pub enum SchemaError {
    /// No header matched any accepted keyword-column alias.
    MissingKeywordColumn {
        source: String,
        headers: Vec<String>,
        accepted: Vec<String>,
    },

    /// The table has no header row at all.
    EmptyHeader { source: String },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKeywordColumn {
                source,
                headers,
                accepted,
            } => write!(
                f,
                "'{source}': no keyword column found. Headers: [{}]. \
                 Accepted names (case-insensitive): [{}]",
                headers.join(", "),
                accepted.join(", ")
            ),
            Self::EmptyHeader { source } => {
                write!(f, "'{source}': table has no header row")
            }
        }
    }
}

impl std::error::Error for SchemaError {}

impl From<SchemaError> for KwThemeError {
    fn from(e: SchemaError) -> Self {
        Self::Schema(e)
    }
}

// ---------------------------------------------------------------------------
// Input errors
// ---------------------------------------------------------------------------

/// Errors reading input tables and rule documents.
#[derive(Debug)]
pub enum InputError {
    /// I/O error reading an input file.
    Io { path: PathBuf, source: io::Error },

    /// CSV decoding error.
    Csv { path: PathBuf, source: csv::Error },

    /// Input file exceeds the maximum allowed size.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// No input tables were found at the given location.
    NoInputs { location: PathBuf },

    /// Too many input tables for one run.
    TooManyInputs { count: usize, max: usize },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Cannot read '{}': {source}", path.display())
            }
            Self::Csv { path, source } => {
                write!(f, "Malformed table '{}': {source}", path.display())
            }
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "'{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::NoInputs { location } => write!(
                f,
                "No input tables (*.csv, *.tsv) found at '{}'",
                location.display()
            ),
            Self::TooManyInputs { count, max } => {
                write!(f, "Too many input tables ({count}), maximum is {max}")
            }
        }
    }
}

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<InputError> for KwThemeError {
    fn from(e: InputError) -> Self {
        Self::Input(e)
    }
}

// ---------------------------------------------------------------------------
// Rule parse warnings (non-fatal)
// ---------------------------------------------------------------------------

/// Why a rule line was degraded to literal substring matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleWarningReason {
    /// The line does not compile as a regular expression.
    InvalidRegex { message: String },

    /// The line is longer than the regex length limit.
    TooLong { length: usize, max_length: usize },
}

/// A rule line that was accepted with degraded (literal) matching.
///
/// Never fatal: the run continues and the warning is carried in the
/// `RuleSet` and the final `AnalysisResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleParseWarning {
    /// 1-based line number in the rule document.
    pub line: usize,

    /// The rule text as written (trimmed).
    pub pattern: String,

    /// What went wrong compiling it as a regex.
    pub reason: RuleWarningReason,
}

impl fmt::Display for RuleParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            RuleWarningReason::InvalidRegex { message } => write!(
                f,
                "rule line {} ('{}') is not a valid regex, matching literally: {message}",
                self.line, self.pattern
            ),
            RuleWarningReason::TooLong { length, max_length } => write!(
                f,
                "rule line {} is {length} chars (regex limit {max_length}), matching literally",
                self.line
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote classification errors
// ---------------------------------------------------------------------------

/// Errors from the remote inference endpoint.
///
/// Apart from `ClientBuild`, these never abort a run: the pipeline maps them
/// to a per-keyword fallback and tallies the reason.
#[derive(Debug)]
pub enum RemoteError {
    /// The HTTP client could not be constructed.
    ClientBuild(String),

    /// Connection to the endpoint failed.
    Unreachable { endpoint: String, message: String },

    /// The call exceeded the per-call timeout.
    Timeout { secs: u64 },

    /// The endpoint answered with a non-2xx status.
    Status { status: u16, body: String },

    /// The response body could not be decoded or carried no label.
    Malformed(String),

    /// The returned label is not one of the fixed themes.
    UnknownLabel(String),

    /// Any other transport-level failure.
    Http(String),
}

impl RemoteError {
    /// Whether a retry of the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientBuild(msg) => write!(f, "cannot build HTTP client: {msg}"),
            Self::Unreachable { endpoint, message } => {
                write!(f, "endpoint '{endpoint}' unreachable: {message}")
            }
            Self::Timeout { secs } => write!(f, "request timed out after {secs}s"),
            Self::Status { status, body } => write!(f, "HTTP {status}: {body}"),
            Self::Malformed(msg) => write!(f, "malformed response: {msg}"),
            Self::UnknownLabel(label) => write!(f, "label '{label}' is not a known theme"),
            Self::Http(msg) => write!(f, "HTTP error: {msg}"),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<RemoteError> for KwThemeError {
    fn from(e: RemoteError) -> Self {
        Self::Remote(e)
    }
}

// ---------------------------------------------------------------------------
// Report write errors
// ---------------------------------------------------------------------------

/// Errors writing the report. Always fatal; the sink removes any temp files.
#[derive(Debug)]
pub enum ReportWriteError {
    /// I/O error writing the report file.
    Io { path: PathBuf, source: io::Error },

    /// CSV serialisation error.
    Csv { path: PathBuf, source: csv::Error },

    /// JSON serialisation error.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The temp file could not be renamed into place.
    Finalise { path: PathBuf, source: io::Error },

    /// No free report filename could be found.
    NameExhausted { directory: PathBuf, prefix: String },
}

impl fmt::Display for ReportWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Report I/O error '{}': {source}", path.display())
            }
            Self::Csv { path, source } => {
                write!(f, "CSV report error '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "JSON report error '{}': {source}", path.display())
            }
            Self::Finalise { path, source } => {
                write!(f, "Cannot finalise report '{}': {source}", path.display())
            }
            Self::NameExhausted { directory, prefix } => write!(
                f,
                "No free report filename for prefix '{prefix}' in '{}'",
                directory.display()
            ),
        }
    }
}

impl std::error::Error for ReportWriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Finalise { source, .. } => Some(source),
            Self::NameExhausted { .. } => None,
        }
    }
}

impl From<ReportWriteError> for KwThemeError {
    fn from(e: ReportWriteError) -> Self {
        Self::Report(e)
    }
}

// ---------------------------------------------------------------------------
// Rule store errors
// ---------------------------------------------------------------------------

/// Errors from saving, loading, or clearing a persisted rule document.
#[derive(Debug)]
pub enum RulesStoreError {
    /// The supplied rule text contained no rules.
    EmptyInput,

    /// I/O error on the rule document.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for RulesStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "rule input is empty; nothing saved"),
            Self::Io { path, source } => {
                write!(f, "Rule document I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for RulesStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::EmptyInput => None,
        }
    }
}

impl From<RulesStoreError> for KwThemeError {
    fn from(e: RulesStoreError) -> Self {
        Self::RulesStore(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for KwThemeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for KwTheme results.
pub type Result<T> = std::result::Result<T, KwThemeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_schema_error_names_source_and_aliases() {
        let err = SchemaError::MissingKeywordColumn {
            source: "march.csv".to_string(),
            headers: vec!["term".to_string(), "clicks".to_string()],
            accepted: vec!["keyword".to_string(), "query".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("march.csv"));
        assert!(msg.contains("term, clicks"));
        assert!(msg.contains("keyword, query"));
    }

    #[test]
    fn test_report_error_preserves_source_chain() {
        let err: KwThemeError = ReportWriteError::Io {
            path: PathBuf::from("out.csv"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        let report = err.source().expect("wrapped report error");
        assert!(report.source().is_some());
        assert!(err.to_string().contains("out.csv"));
    }

    #[test]
    fn test_remote_transient_classification() {
        assert!(RemoteError::Timeout { secs: 5 }.is_transient());
        assert!(RemoteError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!RemoteError::Status {
            status: 401,
            body: String::new()
        }
        .is_transient());
        assert!(!RemoteError::UnknownLabel("sports".to_string()).is_transient());
    }
}
