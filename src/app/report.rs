// KwTheme - app/report.rs
//
// Report persistence. The sink receives the aggregated tables and writes a
// timestamped summary report plus its companion detail table.
//
// Writes are all-or-nothing: both files are rendered in memory, written to
// sibling temp files, then renamed into place. On any failure every temp
// file (and a summary already renamed) is removed, so no partial report is
// ever left behind.

use crate::core::export;
use crate::core::model::Aggregation;
use crate::platform::fs::{remove_quietly, temp_sibling};
use crate::util::constants;
use crate::util::error::ReportWriteError;
use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};

/// Locations of a written report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFiles {
    pub summary: PathBuf,
    pub detail: PathBuf,
}

/// Destination for aggregated results.
pub trait ReportSink: Send + Sync {
    /// Persist the report. Either every file is written or none is.
    fn write(
        &self,
        prefix: &str,
        aggregation: &Aggregation,
    ) -> Result<ReportFiles, ReportWriteError>;
}

/// Writes `<prefix>_<YYYYmmdd_HHMMSS>.csv` and
/// `<prefix>_<YYYYmmdd_HHMMSS>_keywords.csv` into a directory.
#[derive(Debug, Clone)]
pub struct CsvReportSink {
    directory: PathBuf,
    /// Pinned generation time; None = now.
    fixed_time: Option<NaiveDateTime>,
}

impl CsvReportSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            fixed_time: None,
        }
    }

    /// Use a fixed generation time instead of the clock.
    pub fn with_fixed_time(mut self, time: NaiveDateTime) -> Self {
        self.fixed_time = Some(time);
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn timestamp(&self) -> String {
        self.fixed_time
            .unwrap_or_else(|| Local::now().naive_local())
            .format(constants::REPORT_TIMESTAMP_FORMAT)
            .to_string()
    }

    /// First free name pair for this prefix and timestamp.
    ///
    /// Reports generated within the same second get a `_2`, `_3`, ... suffix.
    fn free_names(&self, prefix: &str, stamp: &str) -> Result<ReportFiles, ReportWriteError> {
        let ext = constants::REPORT_EXTENSION;
        for attempt in 1..=constants::MAX_REPORT_NAME_ATTEMPTS {
            let stem = if attempt == 1 {
                format!("{prefix}_{stamp}")
            } else {
                format!("{prefix}_{stamp}_{attempt}")
            };
            let files = ReportFiles {
                summary: self.directory.join(format!("{stem}.{ext}")),
                detail: self
                    .directory
                    .join(format!("{stem}_{}.{ext}", constants::DETAIL_FILE_SUFFIX)),
            };
            if !files.summary.exists() && !files.detail.exists() {
                return Ok(files);
            }
        }
        Err(ReportWriteError::NameExhausted {
            directory: self.directory.clone(),
            prefix: prefix.to_string(),
        })
    }
}

impl ReportSink for CsvReportSink {
    fn write(
        &self,
        prefix: &str,
        aggregation: &Aggregation,
    ) -> Result<ReportFiles, ReportWriteError> {
        std::fs::create_dir_all(&self.directory).map_err(|e| ReportWriteError::Io {
            path: self.directory.clone(),
            source: e,
        })?;

        let files = self.free_names(prefix, &self.timestamp())?;

        let mut summary_bytes = Vec::new();
        export::write_summary_csv(&aggregation.summaries, &mut summary_bytes, &files.summary)?;
        let mut detail_bytes = Vec::new();
        export::write_detail_csv(&aggregation.detail, &mut detail_bytes, &files.detail)?;

        let summary_tmp = temp_sibling(&files.summary);
        let detail_tmp = temp_sibling(&files.detail);

        let outcome = write_pair(
            &files,
            (summary_tmp.as_path(), summary_bytes.as_slice()),
            (detail_tmp.as_path(), detail_bytes.as_slice()),
        );
        if outcome.is_err() {
            remove_quietly(&summary_tmp);
            remove_quietly(&detail_tmp);
        }
        outcome?;

        tracing::info!(
            summary = %files.summary.display(),
            detail = %files.detail.display(),
            themes = aggregation.summaries.len(),
            keywords = aggregation.detail.len(),
            "Report written"
        );
        Ok(files)
    }
}

/// Write both temp files, then rename both into place.
///
/// If the second rename fails the first, already-final file is removed.
fn write_pair(
    files: &ReportFiles,
    summary: (&Path, &[u8]),
    detail: (&Path, &[u8]),
) -> Result<(), ReportWriteError> {
    for (tmp, bytes) in [summary, detail] {
        std::fs::write(tmp, bytes).map_err(|e| ReportWriteError::Io {
            path: tmp.to_path_buf(),
            source: e,
        })?;
    }

    std::fs::rename(summary.0, &files.summary).map_err(|e| ReportWriteError::Finalise {
        path: files.summary.clone(),
        source: e,
    })?;
    if let Err(e) = std::fs::rename(detail.0, &files.detail) {
        remove_quietly(&files.summary);
        return Err(ReportWriteError::Finalise {
            path: files.detail.clone(),
            source: e,
        });
    }
    Ok(())
}
