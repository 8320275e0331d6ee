// KwTheme - platform/table.rs
//
// Input table loading (CSV / TSV) and input-directory discovery.
//
// A directory input is scanned non-recursively for `*.csv` and `*.tsv`;
// spreadsheet lock files (`~$...`) are always skipped. Tables are decoded
// with the `csv` crate into an in-memory `Table` for the extractor.

use crate::core::extract::Table;
use crate::platform::fs::file_size;
use crate::util::constants;
use crate::util::error::InputError;
use std::path::{Path, PathBuf};

/// Field delimiter for a table path: tab for `.tsv`, comma otherwise.
fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

/// Display name used as the record source: the file name.
fn table_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Load one table from disk.
///
/// Rows may be ragged; short rows are kept and missing cells read as blank.
/// Invalid UTF-8 in cells is replaced rather than rejected.
pub fn load_table(path: &Path) -> Result<Table, InputError> {
    let size = file_size(path).map_err(|e| InputError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    if size > constants::MAX_INPUT_FILE_SIZE {
        return Err(InputError::FileTooLarge {
            path: path.to_path_buf(),
            size,
            max_size: constants::MAX_INPUT_FILE_SIZE,
        });
    }

    let csv_err = |e: csv::Error| InputError::Csv {
        path: path.to_path_buf(),
        source: e,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_for(path))
        .flexible(true)
        .has_headers(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| {
            String::from_utf8_lossy(h)
                .trim_start_matches('\u{feff}')
                .to_string()
        })
        .collect();

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(csv_err)?;
        rows.push(
            record
                .iter()
                .map(|cell| String::from_utf8_lossy(cell).into_owned())
                .collect::<Vec<String>>(),
        );
    }

    tracing::debug!(
        path = %path.display(),
        columns = headers.len(),
        rows = rows.len(),
        "Table loaded"
    );

    Ok(Table {
        name: table_name(path),
        location: Some(path.to_path_buf()),
        headers,
        rows,
    })
}

/// Compile glob patterns; invalid ones are logged and skipped.
fn compile_patterns(patterns: &[&str]) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                tracing::warn!(pattern = p, error = %e, "Invalid glob pattern, skipping");
                None
            }
        })
        .collect()
}

fn is_lock_file(file_name: &str) -> bool {
    file_name.starts_with(constants::LOCK_FILE_PREFIX)
}

/// List the input tables directly inside `dir`, sorted by file name.
pub fn discover_tables(dir: &Path) -> Result<Vec<PathBuf>, InputError> {
    let patterns = compile_patterns(constants::INPUT_TABLE_PATTERNS);
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };

    let mut found = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| InputError::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            tracing::debug!(path = %entry.path().display(), "Skipping non-UTF-8 file name");
            continue;
        };
        if is_lock_file(name) {
            tracing::debug!(file = name, "Skipping lock file");
            continue;
        }
        if patterns.iter().any(|p| p.matches_with(name, options)) {
            found.push(entry.into_path());
        }
    }

    if found.is_empty() {
        return Err(InputError::NoInputs {
            location: dir.to_path_buf(),
        });
    }
    Ok(found)
}

/// Expand input locations (files or directories) to table paths.
///
/// Explicit files are taken as given, in order; directories contribute their
/// discovered tables. Duplicated paths are read once.
pub fn resolve_inputs(locations: &[PathBuf]) -> Result<Vec<PathBuf>, InputError> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for location in locations {
        if location.is_dir() {
            paths.extend(discover_tables(location)?);
        } else if location.is_file() {
            paths.push(location.clone());
        } else {
            return Err(InputError::Io {
                path: location.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "input not found"),
            });
        }
    }

    let mut seen = std::collections::HashSet::new();
    paths.retain(|p| seen.insert(p.clone()));

    if paths.is_empty() {
        return Err(InputError::NoInputs {
            location: locations.first().cloned().unwrap_or_default(),
        });
    }
    if paths.len() > constants::MAX_INPUT_TABLES {
        return Err(InputError::TooManyInputs {
            count: paths.len(),
            max: constants::MAX_INPUT_TABLES,
        });
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_csv_with_bom_and_ragged_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kw.csv");
        fs::write(&path, "\u{feff}Keyword,Volume\n\"ppt, template\",500\nlonely\n").unwrap();

        let table = load_table(&path).unwrap();
        assert_eq!(table.name, "kw.csv");
        assert_eq!(table.location.as_deref(), Some(path.as_path()));
        assert_eq!(table.headers, vec!["Keyword", "Volume"]);
        assert_eq!(table.rows[0], vec!["ppt, template", "500"]);
        assert_eq!(table.rows[1], vec!["lonely"]);
    }

    #[test]
    fn test_load_tsv_uses_tab_delimiter() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kw.TSV");
        fs::write(&path, "query\tsearch volume\nbest, crm tool\t1,200\n").unwrap();

        let table = load_table(&path).unwrap();
        assert_eq!(table.headers, vec!["query", "search volume"]);
        assert_eq!(table.rows[0], vec!["best, crm tool", "1,200"]);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_table(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, InputError::Io { .. }));
    }

    #[test]
    fn test_discover_skips_lock_files_and_other_types() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.csv"), "keyword\n").unwrap();
        fs::write(dir.path().join("a.TSV"), "keyword\n").unwrap();
        fs::write(dir.path().join("~$b.csv"), "lock").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.csv"), "keyword\n").unwrap();

        let found = discover_tables(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.TSV", "b.csv"]);
    }

    #[test]
    fn test_discover_empty_dir_is_no_inputs() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            discover_tables(dir.path()),
            Err(InputError::NoInputs { .. })
        ));
    }

    #[test]
    fn test_resolve_inputs_mixes_files_and_dirs() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("data");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("x.csv"), "keyword\n").unwrap();
        let single = dir.path().join("single.csv");
        fs::write(&single, "keyword\n").unwrap();

        let paths = resolve_inputs(&[single.clone(), sub.clone(), single.clone()]).unwrap();
        assert_eq!(paths, vec![single, sub.join("x.csv")]);
    }

    #[test]
    fn test_resolve_inputs_missing_location() {
        let dir = TempDir::new().unwrap();
        let err = resolve_inputs(&[dir.path().join("nope.csv")]).unwrap_err();
        assert!(matches!(err, InputError::Io { .. }));
    }
}
