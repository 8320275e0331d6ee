// KwTheme - app/pipeline.rs
//
// Analysis lifecycle: input tables -> extraction -> rule filter ->
// classification -> aggregation -> report.
//
// Architecture:
//   - Schema and input errors abort before any classification starts.
//   - Classification runs on a dedicated rayon pool; each keyword is an
//     independent task and results are collected in input order.
//   - An `Arc<AtomicBool>` cancel flag stops new remote calls; keywords not
//     yet classified go through the local rules so the result set stays
//     complete and the report is still written. The flag is cleared when a
//     run starts.
//   - Remote failures never abort the run; they are tallied per reason.

use crate::app::report::{CsvReportSink, ReportSink};
use crate::core::aggregate::{aggregate, tally_paths};
use crate::core::classify::FallbackChain;
use crate::core::extract::{Extractor, Table};
use crate::core::filter::filter_records;
use crate::core::model::{
    AnalysisResult, ClassificationPath, ClassifiedKeyword, ExtractionStats, FallbackReason,
    KeywordRecord,
};
use crate::core::remote::RemoteClassifier;
use crate::core::rules::RuleSet;
use crate::platform::config::{validate_prefix, AppConfig, PlatformPaths};
use crate::platform::fs::read_file_lossy;
use crate::platform::table::{load_table, resolve_inputs};
use crate::util::constants;
use crate::util::error::{InputError, Result};
use rayon::prelude::*;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Progress callback: `(classified, total)`, called from worker threads.
///
/// Calls are serialised and `classified` strictly increases within a run;
/// intermediate values may be skipped but the final `(total, total)` is
/// always delivered.
pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// What to analyse.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Input tables or directories of tables.
    pub inputs: Vec<PathBuf>,
    /// Rule document.
    pub rules: PathBuf,
    /// Report filename prefix; None = configured default.
    pub output_prefix: Option<String>,
}

impl AnalysisRequest {
    pub fn new(inputs: Vec<PathBuf>, rules: impl Into<PathBuf>) -> Self {
        Self {
            inputs,
            rules: rules.into(),
            output_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = Some(prefix.into());
        self
    }
}

/// Run a complete analysis with components built from `config`.
pub fn analyze(request: &AnalysisRequest, config: &AppConfig) -> Result<AnalysisResult> {
    Pipeline::from_config(config.clone())?.run(request)
}

/// A configured analysis pipeline. Holds no per-run state; `run` may be
/// called repeatedly and each run is independent of the previous ones.
///
/// Cancellation is for embedding callers: a thread holding
/// [`Pipeline::cancel_flag`] can stop remote calls of the run in progress.
/// The flag is cleared when a run starts, so a cancel only affects the run
/// it was raised during. The CLI runs to completion.
pub struct Pipeline {
    config: AppConfig,
    classifier: FallbackChain,
    sink: Box<dyn ReportSink>,
    cancel: Arc<AtomicBool>,
    progress: Option<Box<ProgressFn>>,
}

impl Pipeline {
    /// Build the classifier chain and report sink from configuration.
    ///
    /// The remote strategy is attached only when it is enabled and has an
    /// endpoint and credential.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let classifier = match config.remote.settings() {
            Some(settings) => {
                FallbackChain::with_primary(Box::new(RemoteClassifier::new(settings)?))
            }
            None => {
                tracing::info!("Remote classification not configured; using local rules only");
                FallbackChain::local_only()
            }
        };

        let results_dir = config
            .results_dir
            .clone()
            .unwrap_or_else(|| PlatformPaths::resolve().results_dir);

        Ok(Self::new(
            config,
            classifier,
            Box::new(CsvReportSink::new(results_dir)),
        ))
    }

    pub fn new(config: AppConfig, classifier: FallbackChain, sink: Box<dyn ReportSink>) -> Self {
        Self {
            config,
            classifier,
            sink,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    /// Share an external cancel flag.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// The flag that cancels the run in progress when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run against on-disk inputs and rule document.
    pub fn run(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        let paths = resolve_inputs(&request.inputs)?;
        let tables = paths
            .iter()
            .map(|p| load_table(p))
            .collect::<std::result::Result<Vec<Table>, InputError>>()?;

        let rules = load_rule_document(&request.rules)?;
        let prefix = self.resolve_prefix(request.output_prefix.as_deref());

        tracing::info!(
            tables = tables.len(),
            rules = rules.len(),
            prefix = %prefix,
            "Analysis started"
        );

        self.run_tables(&tables, &rules, &prefix)
    }

    /// Run against in-memory tables and a parsed rule set.
    pub fn run_tables(
        &self,
        tables: &[Table],
        rules: &RuleSet,
        prefix: &str,
    ) -> Result<AnalysisResult> {
        let started = Instant::now();
        self.cancel.store(false, Ordering::SeqCst);

        // Every table is validated before any classification work.
        let mut extractor = Extractor::new(self.config.columns.clone());
        let stats: Vec<ExtractionStats> = tables
            .iter()
            .map(|t| extractor.add_table(t))
            .collect::<std::result::Result<_, _>>()?;
        let records = extractor.into_records();
        tracing::debug!(tables = stats.len(), keywords = records.len(), "Extraction complete");

        let filtered = filter_records(&records, rules);
        let classified = self.classify_all(&filtered);
        let cancelled = classified
            .iter()
            .any(|c| c.path == ClassificationPath::Fallback(FallbackReason::Cancelled));

        let aggregation = aggregate(&classified, self.config.sample_size);
        let files = self.sink.write(prefix, &aggregation)?;

        let tally = tally_paths(&classified);
        if tally.fallback > 0 {
            tracing::warn!(
                fallback = tally.fallback,
                total = classified.len(),
                reasons = ?tally.reasons,
                "Some keywords fell back to local classification"
            );
        }

        let result = AnalysisResult {
            output_location: files.summary,
            detail_location: Some(files.detail),
            total_keywords: records.len(),
            filtered_keywords: filtered.len(),
            theme_counts: aggregation.theme_counts,
            summaries: aggregation.summaries,
            remote_classified: tally.remote,
            local_classified: tally.local,
            fallback_count: tally.fallback,
            fallback_reasons: tally.reasons,
            rule_warnings: rules.warnings().to_vec(),
            volumes_reported: filtered.iter().filter(|r| r.volume.is_some()).count(),
            cancelled,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            total = result.total_keywords,
            filtered = result.filtered_keywords,
            themes = result.summaries.len(),
            remote = result.remote_classified,
            fallback = result.fallback_count,
            cancelled = result.cancelled,
            duration_ms = result.duration_ms,
            "Analysis complete"
        );

        Ok(result)
    }

    /// Classify every record, in parallel, preserving input order.
    fn classify_all(&self, records: &[KeywordRecord]) -> Vec<ClassifiedKeyword> {
        let total = records.len();
        let done = AtomicUsize::new(0);
        let reported = Mutex::new(0usize);

        let classify_one = |record: &KeywordRecord| {
            let cancelled = self.cancel.load(Ordering::SeqCst);
            let item = self.classifier.classify(record, cancelled);

            let n = done.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(progress) = &self.progress {
                // Workers finish out of order; only report forward progress.
                let mut last = reported.lock().unwrap_or_else(|e| e.into_inner());
                if n > *last {
                    *last = n;
                    progress(n, total);
                }
            }
            if n % constants::PROGRESS_LOG_INTERVAL == 0 {
                tracing::info!(classified = n, total, "Classification progress");
            }
            item
        };

        match self.build_pool() {
            Some(pool) => pool.install(|| records.par_iter().map(classify_one).collect()),
            None => records.par_iter().map(classify_one).collect(),
        }
    }

    /// Dedicated pool sized from config; None = rayon's global pool.
    fn build_pool(&self) -> Option<rayon::ThreadPool> {
        if self.config.worker_threads == 0 {
            return None;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_threads)
            .thread_name(|i| format!("kwtheme-classify-{i}"))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot build classification pool; using global pool");
                None
            }
        }
    }

    fn resolve_prefix(&self, requested: Option<&str>) -> String {
        match requested.map(validate_prefix) {
            Some(Ok(prefix)) => prefix,
            Some(Err(msg)) => {
                tracing::warn!(
                    reason = %msg,
                    fallback = %self.config.output_prefix,
                    "Output prefix rejected; using configured prefix"
                );
                self.config.output_prefix.clone()
            }
            None => self.config.output_prefix.clone(),
        }
    }
}

/// Read and parse a rule document.
///
/// A missing document yields an empty rule set, which keeps nothing.
fn load_rule_document(path: &std::path::Path) -> Result<RuleSet> {
    match read_file_lossy(path) {
        Ok(text) => Ok(RuleSet::parse(&text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(
                path = %path.display(),
                "Rule document not found; no keywords will pass the filter"
            );
            Ok(RuleSet::default())
        }
        Err(e) => Err(InputError::Io {
            path: path.to_path_buf(),
            source: e,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::Classifier;
    use crate::core::model::Theme;
    use crate::util::error::{KwThemeError, RemoteError};
    use tempfile::TempDir;

    fn table(rows: &[(&str, Option<&str>)]) -> Table {
        Table {
            name: "kw.csv".to_string(),
            location: None,
            headers: vec!["Keyword".to_string(), "Volume".to_string()],
            rows: rows
                .iter()
                .map(|(k, v)| vec![k.to_string(), v.unwrap_or("").to_string()])
                .collect(),
        }
    }

    fn local_pipeline(dir: &TempDir) -> Pipeline {
        Pipeline::new(
            AppConfig::default(),
            FallbackChain::local_only(),
            Box::new(CsvReportSink::new(dir.path())),
        )
    }

    /// Remote double that fails every call and flips the cancel flag after
    /// the first one.
    struct FailingThenCancel {
        flag: Arc<AtomicBool>,
        calls: Mutex<usize>,
    }

    impl Classifier for FailingThenCancel {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn classify(&self, _record: &KeywordRecord) -> std::result::Result<Theme, RemoteError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            self.flag.store(true, Ordering::SeqCst);
            Err(RemoteError::Timeout { secs: 1 })
        }
    }

    /// Remote double that always answers `Trend` and raises the cancel flag
    /// on its `cancel_on`-th call (1-based) across the pipeline's lifetime.
    struct CancelOnCall {
        flag: Arc<AtomicBool>,
        calls: Arc<AtomicUsize>,
        cancel_on: usize,
    }

    impl Classifier for CancelOnCall {
        fn name(&self) -> &'static str {
            "cancel-on-call"
        }

        fn classify(&self, _record: &KeywordRecord) -> std::result::Result<Theme, RemoteError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.cancel_on {
                self.flag.store(true, Ordering::SeqCst);
            }
            Ok(Theme::Trend)
        }
    }

    fn cancelling_pipeline(dir: &TempDir, cancel_on: usize) -> (Pipeline, Arc<AtomicUsize>) {
        let flag = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let remote = CancelOnCall {
            flag: Arc::clone(&flag),
            calls: Arc::clone(&calls),
            cancel_on,
        };
        let mut config = AppConfig::default();
        config.worker_threads = 1;
        let pipeline = Pipeline::new(
            config,
            FallbackChain::with_primary(Box::new(remote)),
            Box::new(CsvReportSink::new(dir.path())),
        )
        .with_cancel_flag(flag);
        (pipeline, calls)
    }

    #[test]
    fn test_end_to_end_local() {
        let dir = TempDir::new().unwrap();
        let t = table(&[
            ("PPT template free", Some("500")),
            ("best CRM tool", Some("200")),
            ("random unrelated term", Some("50")),
        ]);
        let rules = RuleSet::parse("PPT\ntemplate\nCRM");
        let result = local_pipeline(&dir).run_tables(&[t], &rules, "test").unwrap();

        assert_eq!(result.total_keywords, 3);
        assert_eq!(result.filtered_keywords, 2);
        assert_eq!(result.theme_counts.len(), 2);
        assert_eq!(result.theme_counts[&Theme::TemplateResource], 1);
        assert_eq!(result.theme_counts[&Theme::ToolSoftware], 1);
        assert_eq!(result.local_classified, 2);
        assert_eq!(result.fallback_count, 0);
        assert!(result.output_location.exists());
    }

    #[test]
    fn test_schema_error_aborts_before_classification() {
        let dir = TempDir::new().unwrap();
        let good = table(&[("crm", None)]);
        let bad = Table {
            name: "bad.csv".to_string(),
            location: None,
            headers: vec!["term".to_string()],
            rows: vec![vec!["crm".to_string()]],
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let pipeline = local_pipeline(&dir).with_progress(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let err = pipeline
            .run_tables(&[good, bad], &RuleSet::parse("crm"), "test")
            .unwrap_err();
        assert!(matches!(err, KwThemeError::Schema(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_progress_reaches_total() {
        let dir = TempDir::new().unwrap();
        let rows: Vec<(String, Option<&str>)> =
            (0..20).map(|i| (format!("crm tool {i}"), None)).collect();
        let rows_ref: Vec<(&str, Option<&str>)> =
            rows.iter().map(|(k, v)| (k.as_str(), *v)).collect();

        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let mut config = AppConfig::default();
        config.worker_threads = 4;
        let pipeline = Pipeline::new(
            config,
            FallbackChain::local_only(),
            Box::new(CsvReportSink::new(dir.path())),
        )
        .with_progress(move |done, total| {
            assert_eq!(total, 20);
            seen.lock().unwrap().push(done);
        });
        pipeline
            .run_tables(&[table(&rows_ref)], &RuleSet::parse("crm"), "p")
            .unwrap();

        let calls = calls.lock().unwrap();
        assert!(calls.windows(2).all(|w| w[0] < w[1]), "not increasing: {calls:?}");
        assert_eq!(calls.last(), Some(&20));
    }

    #[test]
    fn test_cancel_stops_remote_calls_but_completes() {
        let dir = TempDir::new().unwrap();
        let flag = Arc::new(AtomicBool::new(false));
        let remote = FailingThenCancel {
            flag: Arc::clone(&flag),
            calls: Mutex::new(0),
        };
        let mut config = AppConfig::default();
        config.worker_threads = 1;
        let pipeline = Pipeline::new(
            config,
            FallbackChain::with_primary(Box::new(remote)),
            Box::new(CsvReportSink::new(dir.path())),
        )
        .with_cancel_flag(Arc::clone(&flag));

        let t = table(&[("crm a", None), ("crm b", None), ("crm c", None)]);
        let result = pipeline.run_tables(&[t], &RuleSet::parse("crm"), "c").unwrap();

        assert!(result.cancelled);
        assert_eq!(result.filtered_keywords, 3);
        assert_eq!(result.theme_counts.values().sum::<usize>(), 3);
        assert_eq!(result.fallback_reasons.get("timeout"), Some(&1));
        assert_eq!(result.fallback_reasons.get("cancelled"), Some(&2));
        assert!(result.output_location.exists());
    }

    #[test]
    fn test_cancel_does_not_carry_into_next_run() {
        let dir = TempDir::new().unwrap();
        let (pipeline, calls) = cancelling_pipeline(&dir, 1);
        let rules = RuleSet::parse("crm");
        let t = table(&[("crm a", None), ("crm b", None), ("crm c", None)]);

        let first = pipeline.run_tables(&[t.clone()], &rules, "one").unwrap();
        assert!(first.cancelled);
        assert_eq!(first.remote_classified, 1);
        assert_eq!(first.fallback_reasons.get("cancelled"), Some(&2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let second = pipeline.run_tables(&[t], &rules, "two").unwrap();
        assert!(!second.cancelled);
        assert_eq!(second.remote_classified, 3);
        assert!(second.fallback_reasons.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_cancel_after_last_keyword_is_not_reported() {
        let dir = TempDir::new().unwrap();
        let (pipeline, _calls) = cancelling_pipeline(&dir, 2);
        let t = table(&[("crm a", None), ("crm b", None)]);

        let result = pipeline.run_tables(&[t], &RuleSet::parse("crm"), "late").unwrap();
        assert!(pipeline.cancel_flag().load(Ordering::SeqCst));
        assert!(!result.cancelled);
        assert_eq!(result.remote_classified, 2);
        assert_eq!(result.fallback_count, 0);
    }

    #[test]
    fn test_output_order_matches_input_under_parallelism() {
        let dir = TempDir::new().unwrap();
        let texts: Vec<String> = (0..200).map(|i| format!("kw {i:03}")).collect();
        let records: Vec<KeywordRecord> = texts
            .iter()
            .filter_map(|k| KeywordRecord::new(k, None, "t"))
            .collect();

        let classified = local_pipeline(&dir).classify_all(&records);
        let out: Vec<&str> = classified.iter().map(|c| c.record.text.as_str()).collect();
        assert_eq!(out, texts.iter().map(String::as_str).collect::<Vec<_>>());
        assert!(classified
            .iter()
            .all(|c| c.path == ClassificationPath::Local && c.theme == Theme::Other));
    }

    #[test]
    fn test_missing_rule_document_keeps_nothing() {
        let dir = TempDir::new().unwrap();
        let rules = load_rule_document(&dir.path().join("absent.md")).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_invalid_request_prefix_uses_configured_prefix() {
        let dir = TempDir::new().unwrap();
        let pipeline = local_pipeline(&dir);
        assert_eq!(pipeline.resolve_prefix(Some("a/b")), constants::DEFAULT_OUTPUT_PREFIX);
        assert_eq!(pipeline.resolve_prefix(Some("weekly")), "weekly");
        assert_eq!(pipeline.resolve_prefix(None), constants::DEFAULT_OUTPUT_PREFIX);
    }

    #[test]
    fn test_fallback_reason_recorded_on_keywords() {
        let flag = Arc::new(AtomicBool::new(false));
        let chain = FallbackChain::with_primary(Box::new(FailingThenCancel {
            flag,
            calls: Mutex::new(0),
        }));
        let record = KeywordRecord::new("best crm tool", None, "t").unwrap();
        let out = chain.classify(&record, false);
        assert_eq!(out.path, ClassificationPath::Fallback(FallbackReason::Timeout));
        assert_eq!(out.theme, Theme::ToolSoftware);
    }
}
