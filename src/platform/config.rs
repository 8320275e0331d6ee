// KwTheme - platform/config.rs
//
// Platform-specific data directory resolution and config.toml loading with
// startup validation, plus environment overrides.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.
//
// The resulting `AppConfig` is built once at startup and handed to each
// component; nothing else reads the environment or config file.

use crate::core::extract::ColumnAliases;
use crate::core::remote::{ApiFlavor, RemoteSettings};
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Resolved platform paths for KwTheme data and configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/kwtheme/ or %APPDATA%\KwTheme\config\)
    pub config_dir: PathBuf,

    /// Data directory holding the rule document and results.
    pub data_dir: PathBuf,

    /// Default directory for generated reports.
    pub results_dir: PathBuf,

    /// Default rule document path.
    pub rules_file: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self::rooted(config_dir, data_dir)
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self::rooted(fallback.clone(), fallback)
        }
    }

    fn rooted(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            results_dir: data_dir.join(constants::RESULTS_DIR_NAME),
            rules_file: data_dir.join(constants::RULES_FILE_NAME),
            config_dir,
            data_dir,
        }
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility -- a newer
/// config file can be used with an older binary without crashing.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub remote: RemoteSection,
    pub columns: ColumnsSection,
    pub report: ReportSection,
    pub classification: ClassificationSection,
    pub logging: LoggingSection,
}

/// `[remote]` config section.
#[derive(Default, serde::Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    pub enabled: Option<bool>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// "openai" or "dashscope".
    pub flavor: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout_secs: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl std::fmt::Debug for RemoteSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSection")
            .field("enabled", &self.enabled)
            .field("model", &self.model)
            .field("flavor", &self.flavor)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// `[columns]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ColumnsSection {
    /// Keyword column aliases, priority order.
    pub keyword: Option<Vec<String>>,
    /// Volume column aliases, priority order.
    pub volume: Option<Vec<String>>,
}

/// `[report]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub output_prefix: Option<String>,
    pub results_dir: Option<String>,
    pub sample_size: Option<usize>,
}

/// `[classification]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ClassificationSection {
    /// Number of worker threads (0 = auto).
    pub worker_threads: Option<usize>,
    /// Rule document used when none is given on the command line.
    pub rules_file: Option<String>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

/// Validated remote classifier configuration.
#[derive(Clone, PartialEq)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub flavor: ApiFlavor,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: constants::DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            model: constants::DEFAULT_MODEL.to_string(),
            flavor: ApiFlavor::default(),
            max_tokens: constants::DEFAULT_MAX_TOKENS,
            temperature: constants::DEFAULT_TEMPERATURE,
            timeout_secs: constants::DEFAULT_TIMEOUT_SECS,
            retry_attempts: constants::DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: constants::DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl RemoteConfig {
    /// Settings for the remote classifier, or `None` when remote
    /// classification is disabled or lacks an endpoint or credential.
    pub fn settings(&self) -> Option<RemoteSettings> {
        if !self.enabled || self.endpoint.trim().is_empty() || self.api_key.trim().is_empty() {
            return None;
        }
        Some(RemoteSettings {
            endpoint: self.endpoint.trim().to_string(),
            api_key: self.api_key.trim().to_string(),
            model: self.model.clone(),
            flavor: self.flavor,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout_secs: self.timeout_secs,
            retry_attempts: self.retry_attempts,
            retry_delay_ms: self.retry_delay_ms,
        })
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("enabled", &self.enabled)
            .field("endpoint", &crate::util::logging::endpoint_preview(&self.endpoint))
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("model", &self.model)
            .field("flavor", &self.flavor)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

/// Validated application configuration.
///
/// All values are validated against named constants at load time.
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // -- Remote --
    pub remote: RemoteConfig,

    // -- Columns --
    pub columns: ColumnAliases,

    // -- Report --
    pub output_prefix: String,
    /// Report directory; None = platform default.
    pub results_dir: Option<PathBuf>,
    /// Sample keywords kept per theme.
    pub sample_size: usize,

    // -- Classification --
    /// Worker threads for classification (0 = rayon default).
    pub worker_threads: usize,
    /// Rule document; None = platform default.
    pub rules_file: Option<PathBuf>,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    /// Log file path.
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            columns: ColumnAliases::default(),
            output_prefix: constants::DEFAULT_OUTPUT_PREFIX.to_string(),
            results_dir: None,
            sample_size: constants::DEFAULT_SAMPLE_SIZE,
            worker_threads: constants::DEFAULT_WORKER_THREADS,
            rules_file: None,
            log_level: None,
            log_file: None,
        }
    }
}

/// Load and validate `config.toml` from the given config directory.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first-run).
/// If the file is unparseable, returns defaults with an error warning.
pub fn load_config(config_dir: &Path) -> (AppConfig, Vec<String>) {
    let config_path = config_dir.join(constants::CONFIG_FILE_NAME);

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), Vec::new());
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => parse_config(&content, &config_path),
        Err(e) => {
            let msg = format!(
                "{}. Using defaults.",
                ConfigError::Io {
                    path: config_path.clone(),
                    source: e,
                }
            );
            tracing::warn!("{}", msg);
            (AppConfig::default(), vec![msg])
        }
    }
}

/// Parse and validate config text. `path` is only used in messages.
pub fn parse_config(content: &str, path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    let raw: RawConfig = match toml::from_str(content) {
        Ok(r) => r,
        Err(e) => {
            let msg = format!(
                "{}. Using defaults.",
                ConfigError::TomlParse {
                    path: path.to_path_buf(),
                    source: e,
                }
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %path.display(), "Loaded config.toml");

    // Validate each field against named constants, accumulating all errors.
    let mut config = AppConfig::default();
    let remote = &mut config.remote;

    // -- Remote --
    if let Some(enabled) = raw.remote.enabled {
        remote.enabled = enabled;
    }
    if let Some(endpoint) = raw.remote.endpoint {
        remote.endpoint = endpoint.trim().to_string();
    }
    if let Some(key) = raw.remote.api_key {
        remote.api_key = key.trim().to_string();
    }
    if let Some(model) = raw.remote.model {
        if model.trim().is_empty() {
            warnings.push(format!(
                "[remote] model is empty. Using default ({}).",
                constants::DEFAULT_MODEL
            ));
        } else {
            remote.model = model.trim().to_string();
        }
    }
    if let Some(ref flavor) = raw.remote.flavor {
        match ApiFlavor::parse(flavor) {
            Some(f) => remote.flavor = f,
            None => warnings.push(format!(
                "[remote] flavor = \"{flavor}\" is not recognised. \
                 Expected \"openai\" or \"dashscope\". Using default (openai)."
            )),
        }
    }
    remote.max_tokens = in_range(
        "[remote] max_tokens",
        raw.remote.max_tokens,
        1,
        constants::ABSOLUTE_MAX_TOKENS,
        constants::DEFAULT_MAX_TOKENS,
        &mut warnings,
    );
    remote.temperature = in_range(
        "[remote] temperature",
        raw.remote.temperature,
        constants::MIN_TEMPERATURE,
        constants::MAX_TEMPERATURE,
        constants::DEFAULT_TEMPERATURE,
        &mut warnings,
    );
    remote.timeout_secs = in_range(
        "[remote] timeout_secs",
        raw.remote.timeout_secs,
        constants::MIN_TIMEOUT_SECS,
        constants::MAX_TIMEOUT_SECS,
        constants::DEFAULT_TIMEOUT_SECS,
        &mut warnings,
    );
    remote.retry_attempts = in_range(
        "[remote] retry_attempts",
        raw.remote.retry_attempts,
        0,
        constants::MAX_RETRY_ATTEMPTS,
        constants::DEFAULT_RETRY_ATTEMPTS,
        &mut warnings,
    );
    remote.retry_delay_ms = in_range(
        "[remote] retry_delay_ms",
        raw.remote.retry_delay_ms,
        0,
        constants::MAX_RETRY_DELAY_MS,
        constants::DEFAULT_RETRY_DELAY_MS,
        &mut warnings,
    );

    // -- Columns --
    if let Some(aliases) = raw.columns.keyword {
        match non_empty_aliases(aliases) {
            Some(list) => config.columns.keyword = list,
            None => warnings.push("[columns] keyword has no aliases. Using defaults.".to_string()),
        }
    }
    if let Some(aliases) = raw.columns.volume {
        match non_empty_aliases(aliases) {
            Some(list) => config.columns.volume = list,
            None => warnings.push("[columns] volume has no aliases. Using defaults.".to_string()),
        }
    }

    // -- Report --
    if let Some(prefix) = raw.report.output_prefix {
        match validate_prefix(&prefix) {
            Ok(p) => config.output_prefix = p,
            Err(msg) => warnings.push(format!("[report] output_prefix: {msg}")),
        }
    }
    if let Some(dir) = raw.report.results_dir {
        if !dir.trim().is_empty() {
            config.results_dir = Some(PathBuf::from(dir.trim()));
        }
    }
    config.sample_size = in_range(
        "[report] sample_size",
        raw.report.sample_size,
        1,
        constants::MAX_SAMPLE_SIZE,
        constants::DEFAULT_SAMPLE_SIZE,
        &mut warnings,
    );

    // -- Classification --
    config.worker_threads = in_range(
        "[classification] worker_threads",
        raw.classification.worker_threads,
        0,
        constants::MAX_WORKER_THREADS,
        constants::DEFAULT_WORKER_THREADS,
        &mut warnings,
    );
    if let Some(file) = raw.classification.rules_file {
        if !file.trim().is_empty() {
            config.rules_file = Some(PathBuf::from(file.trim()));
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    // -- Logging: file --
    if let Some(ref file) = raw.logging.file {
        if !file.is_empty() {
            config.log_file = Some(file.clone());
        }
    }

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

/// Accept `value` if within `min..=max`, otherwise warn and use `default`.
fn in_range<T>(
    field: &str,
    value: Option<T>,
    min: T,
    max: T,
    default: T,
    warnings: &mut Vec<String>,
) -> T
where
    T: PartialOrd + Display + Copy,
{
    match value {
        None => default,
        Some(v) if v >= min && v <= max => v,
        Some(v) => {
            warnings.push(format!(
                "{}. Using default ({default}).",
                ConfigError::ValueOutOfRange {
                    field: field.to_string(),
                    value: v.to_string(),
                    expected: format!("{min}-{max}"),
                }
            ));
            default
        }
    }
}

fn non_empty_aliases(aliases: Vec<String>) -> Option<Vec<String>> {
    let list: Vec<String> = aliases
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    (!list.is_empty()).then_some(list)
}

/// Validate a report filename prefix: non-empty, bounded, no path separators.
pub fn validate_prefix(prefix: &str) -> Result<String, String> {
    let trimmed = prefix.trim();
    if trimmed.is_empty() {
        return Err("prefix is empty".to_string());
    }
    if trimmed.chars().count() > constants::MAX_OUTPUT_PREFIX_LENGTH {
        return Err(format!(
            "prefix is longer than {} characters",
            constants::MAX_OUTPUT_PREFIX_LENGTH
        ));
    }
    let forbidden = |c: char| {
        matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control()
    };
    if trimmed.chars().any(forbidden) {
        return Err(format!("prefix '{trimmed}' contains characters not allowed in file names"));
    }
    Ok(trimmed.to_string())
}

// =============================================================================
// Environment overrides
// =============================================================================

/// Apply `KWTHEME_*` environment overrides on top of a loaded config.
///
/// `lookup` resolves a variable name to its value; pass
/// `|k| std::env::var(k).ok()` in production. Returns warnings for values
/// that were present but invalid.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut warnings = Vec::new();
    let var = |name: &str| {
        let key = format!("{}{name}", constants::ENV_PREFIX);
        lookup(&key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(|v| (key, v))
    };

    if let Some((_, v)) = var("API_ENDPOINT") {
        config.remote.endpoint = v;
    }
    if let Some((_, v)) = var("API_KEY") {
        config.remote.api_key = v;
    }
    if let Some((_, v)) = var("MODEL") {
        config.remote.model = v;
    }
    if let Some((key, v)) = var("API_FLAVOR") {
        match ApiFlavor::parse(&v) {
            Some(f) => config.remote.flavor = f,
            None => warnings.push(format!(
                "{key} = \"{v}\" is not recognised. Expected \"openai\" or \"dashscope\"."
            )),
        }
    }
    if let Some((key, v)) = var("TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(secs) => {
                config.remote.timeout_secs = in_range(
                    &key,
                    Some(secs),
                    constants::MIN_TIMEOUT_SECS,
                    constants::MAX_TIMEOUT_SECS,
                    config.remote.timeout_secs,
                    &mut warnings,
                )
            }
            Err(_) => warnings.push(format!("{key} = \"{v}\" is not a whole number of seconds.")),
        }
    }
    if let Some((_, v)) = var("RESULTS_DIR") {
        config.results_dir = Some(PathBuf::from(v));
    }
    if let Some((key, v)) = var("OUTPUT_PREFIX") {
        match validate_prefix(&v) {
            Ok(p) => config.output_prefix = p,
            Err(msg) => warnings.push(format!("{key}: {msg}")),
        }
    }

    for w in &warnings {
        tracing::warn!("{}", w);
    }
    warnings
}
