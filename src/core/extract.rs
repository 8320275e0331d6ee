// KwTheme - core/extract.rs
//
// Keyword extraction from in-memory tables.
// Core layer: pure logic, no I/O. Tables are loaded by platform::table.
//
// Column detection resolves the keyword column by alias priority
// (case-insensitive header match); the volume column is optional and, when
// absent, leaves every record's volume unset rather than zero.

use crate::core::model::{ExtractionStats, KeywordRecord};
use crate::util::constants;
use crate::util::error::SchemaError;
use std::collections::HashMap;
use std::path::PathBuf;

/// A header row plus data rows, independent of on-disk format.
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// Display name, used as the record `source`.
    pub name: String,
    /// Where the table was read from; None for in-memory tables.
    pub location: Option<PathBuf>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Full location for diagnostics, falling back to the name.
    pub fn location_label(&self) -> String {
        match &self.location {
            Some(path) => path.display().to_string(),
            None => self.name.clone(),
        }
    }
}

/// Accepted header names for the keyword and volume columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnAliases {
    /// Priority order: the first alias present in the header wins.
    pub keyword: Vec<String>,
    pub volume: Vec<String>,
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            keyword: to_owned_list(constants::DEFAULT_KEYWORD_ALIASES),
            volume: to_owned_list(constants::DEFAULT_VOLUME_ALIASES),
        }
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Resolved column positions for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub keyword: usize,
    pub volume: Option<usize>,
}

/// Resolve keyword and volume columns against the aliases.
pub fn resolve_columns(table: &Table, aliases: &ColumnAliases) -> Result<ColumnMap, SchemaError> {
    if table.headers.iter().all(|h| clean_header(h).is_empty()) {
        return Err(SchemaError::EmptyHeader {
            source: table.location_label(),
        });
    }

    let keyword = find_column(&table.headers, &aliases.keyword).ok_or_else(|| {
        SchemaError::MissingKeywordColumn {
            source: table.location_label(),
            headers: table.headers.iter().map(|h| clean_header(h)).collect(),
            accepted: aliases.keyword.clone(),
        }
    })?;
    let volume = find_column(&table.headers, &aliases.volume).filter(|&idx| idx != keyword);

    Ok(ColumnMap { keyword, volume })
}

fn find_column(headers: &[String], aliases: &[String]) -> Option<usize> {
    let cleaned: Vec<String> = headers.iter().map(|h| clean_header(h)).collect();
    aliases.iter().find_map(|alias| {
        let wanted = clean_header(alias);
        cleaned.iter().position(|h| *h == wanted)
    })
}

/// Lower-case, trim, and drop a leading byte-order mark.
fn clean_header(header: &str) -> String {
    header.trim_start_matches('\u{feff}').trim().to_lowercase()
}

/// Outcome of parsing one volume cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeCell {
    /// Blank cell.
    Absent,
    Valid(f64),
    /// Present but not a finite, non-negative number.
    Invalid,
}

/// Parse a volume cell. Thousands separators (`,` `_` and spaces) are ignored.
pub fn parse_volume(cell: &str) -> VolumeCell {
    let cleaned: String = cell
        .chars()
        .filter(|c| !matches!(c, ',' | '_') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return VolumeCell::Absent;
    }
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => VolumeCell::Valid(v + 0.0),
        _ => VolumeCell::Invalid,
    }
}

/// Accumulates deduplicated keyword records across one or more tables.
///
/// Records keep first-appearance order. A later duplicate only contributes
/// its volume when the earlier record had none.
#[derive(Debug, Default)]
pub struct Extractor {
    aliases: ColumnAliases,
    records: Vec<KeywordRecord>,
    index: HashMap<String, usize>,
}

impl Extractor {
    pub fn new(aliases: ColumnAliases) -> Self {
        Self {
            aliases,
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Extract one table into the accumulated set.
    ///
    /// Fails without touching the accumulated records if the table has no
    /// keyword column.
    pub fn add_table(&mut self, table: &Table) -> Result<ExtractionStats, SchemaError> {
        let columns = resolve_columns(table, &self.aliases)?;

        let mut stats = ExtractionStats {
            source: table.name.clone(),
            keyword_column: clean_header(&table.headers[columns.keyword]),
            volume_column: columns.volume.map(|i| clean_header(&table.headers[i])),
            ..Default::default()
        };

        for row in &table.rows {
            stats.rows_read += 1;

            let text = row.get(columns.keyword).map(String::as_str).unwrap_or("");
            let volume = match columns.volume.and_then(|i| row.get(i)) {
                Some(cell) => match parse_volume(cell) {
                    VolumeCell::Valid(v) => Some(v),
                    VolumeCell::Absent => None,
                    VolumeCell::Invalid => {
                        stats.invalid_volumes += 1;
                        tracing::debug!(
                            source = %table.name,
                            row = stats.rows_read,
                            cell = %cell,
                            "Unparsable volume treated as absent"
                        );
                        None
                    }
                },
                None => None,
            };

            let Some(record) = KeywordRecord::new(text, volume, &table.name) else {
                stats.blank_rows += 1;
                continue;
            };

            match self.index.get(&record.normalized) {
                Some(&existing) => {
                    stats.duplicates_merged += 1;
                    let kept = &mut self.records[existing];
                    if kept.volume.is_none() && record.volume.is_some() {
                        kept.volume = record.volume;
                    }
                }
                None => {
                    self.index
                        .insert(record.normalized.clone(), self.records.len());
                    self.records.push(record);
                }
            }
        }

        tracing::info!(
            source = %stats.source,
            keyword_column = %stats.keyword_column,
            volume_column = stats.volume_column.as_deref().unwrap_or("-"),
            rows = stats.rows_read,
            blank = stats.blank_rows,
            merged = stats.duplicates_merged,
            invalid_volumes = stats.invalid_volumes,
            "Table extracted"
        );

        Ok(stats)
    }

    /// Records accumulated so far.
    pub fn records(&self) -> &[KeywordRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<KeywordRecord> {
        self.records
    }
}

/// Extract a deduplicated record list from a sequence of tables.
///
/// Fails on the first table without a keyword column.
pub fn extract_keywords(
    tables: &[Table],
    aliases: &ColumnAliases,
) -> Result<(Vec<KeywordRecord>, Vec<ExtractionStats>), SchemaError> {
    let mut extractor = Extractor::new(aliases.clone());
    let stats = tables
        .iter()
        .map(|t| extractor.add_table(t))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((extractor.into_records(), stats))
}
