// KwTheme - core/export.rs
//
// CSV and JSON serialisation of the report tables.
// Core layer: writes to any Write implementor; file handling and atomic
// placement live in app::report.

use crate::core::model::{AnalysisResult, ClassificationPath, ClassifiedKeyword, ThemeSummary};
use crate::util::constants;
use crate::util::error::ReportWriteError;
use std::io::Write;
use std::path::Path;

/// Summary report header, one row per theme.
pub const SUMMARY_HEADER: [&str; 4] = ["theme", "keyword_count", "total_volume", "sample_keywords"];

/// Detail table header, one row per classified keyword.
pub const DETAIL_HEADER: [&str; 5] = ["theme", "keyword", "volume", "source", "classified_by"];

/// Write the per-theme summary as CSV.
///
/// `total_volume` is left blank for themes where no keyword carried a volume,
/// so "not reported" stays distinguishable from a true zero.
pub fn write_summary_csv<W: Write>(
    summaries: &[ThemeSummary],
    writer: W,
    path: &Path,
) -> Result<usize, ReportWriteError> {
    let csv_err = |e: csv::Error| ReportWriteError::Csv {
        path: path.to_path_buf(),
        source: e,
    };
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(SUMMARY_HEADER).map_err(csv_err)?;

    for s in summaries {
        let volume = if s.has_volume() {
            s.total_volume.to_string()
        } else {
            String::new()
        };
        csv_writer
            .write_record([
                s.theme.label(),
                &s.keyword_count.to_string(),
                &volume,
                &s.sample_keywords.join(constants::SAMPLE_SEPARATOR),
            ])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| ReportWriteError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(summaries.len())
}

/// Write the per-keyword detail table as CSV.
pub fn write_detail_csv<W: Write>(
    detail: &[ClassifiedKeyword],
    writer: W,
    path: &Path,
) -> Result<usize, ReportWriteError> {
    let csv_err = |e: csv::Error| ReportWriteError::Csv {
        path: path.to_path_buf(),
        source: e,
    };
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(DETAIL_HEADER).map_err(csv_err)?;

    for item in detail {
        let volume = item.record.volume.map(|v| v.to_string()).unwrap_or_default();
        csv_writer
            .write_record([
                item.theme.label(),
                &item.record.text,
                &volume,
                &item.record.source,
                &path_label(&item.path),
            ])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| ReportWriteError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(detail.len())
}

/// `remote`, `local`, or `fallback:<reason>`.
pub fn path_label(path: &ClassificationPath) -> String {
    match path {
        ClassificationPath::Remote => "remote".to_string(),
        ClassificationPath::Local => "local".to_string(),
        ClassificationPath::Fallback(reason) => format!("fallback:{}", reason.label()),
    }
}

/// Write the analysis result as pretty-printed JSON.
pub fn write_result_json<W: Write>(
    result: &AnalysisResult,
    writer: W,
    path: &Path,
) -> Result<(), ReportWriteError> {
    serde_json::to_writer_pretty(writer, result).map_err(|e| ReportWriteError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}
