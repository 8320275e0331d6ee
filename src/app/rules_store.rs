// KwTheme - app/rules_store.rs
//
// Persisted rule document management: save free-form input as a clean rule
// document, list the stored rules, clear them.
//
// Saved documents are sorted and deduplicated, start with a comment header,
// and are written atomically.

use crate::platform::fs::{atomic_write, read_file_lossy};
use crate::util::constants;
use crate::util::error::RulesStoreError;
use chrono::Local;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;

/// Split free-form input into rule tokens.
///
/// Commas (ASCII and full-width), newlines and any whitespace separate
/// tokens. Comment lines are dropped. The result is sorted and deduplicated.
pub fn split_rule_input(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with(constants::RULE_COMMENT_MARKER))
        .flat_map(|line| line.split(|c: char| c == ',' || c == '，' || c.is_whitespace()))
        .map(str::trim)
        .filter(|token| !token.is_empty() && !token.starts_with(constants::RULE_SEPARATOR_MARKER))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Render a rule document with its comment header.
pub fn render_rule_document(rules: &[String]) -> String {
    let mut doc = String::new();
    doc.push_str("# Keyword rules\n");
    doc.push_str(&format!(
        "# Saved {} by {} {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        constants::APP_NAME,
        constants::APP_VERSION
    ));
    doc.push_str("# One rule per line. Lines starting with # are comments.\n");
    doc.push_str("# A rule is a case-insensitive regex, or a literal if it is not valid regex.\n");
    doc.push('\n');
    for rule in rules {
        doc.push_str(rule);
        doc.push('\n');
    }
    doc
}

/// Save free-form rule input to `path`, replacing any existing document.
///
/// Returns the number of rules written.
pub fn save_rules(path: &Path, input: &str) -> Result<usize, RulesStoreError> {
    let rules = split_rule_input(input);
    if rules.is_empty() {
        return Err(RulesStoreError::EmptyInput);
    }

    let io_err = |e: io::Error| RulesStoreError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    atomic_write(path, render_rule_document(&rules).as_bytes()).map_err(io_err)?;

    tracing::info!(path = %path.display(), rules = rules.len(), "Rule document saved");
    Ok(rules.len())
}

/// The rule lines stored at `path`, in document order.
///
/// A missing document has no rules.
pub fn load_rules(path: &Path) -> Result<Vec<String>, RulesStoreError> {
    let text = match read_file_lossy(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(RulesStoreError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| {
            !l.is_empty()
                && !l.starts_with(constants::RULE_COMMENT_MARKER)
                && !l.starts_with(constants::RULE_SEPARATOR_MARKER)
        })
        .map(str::to_string)
        .collect())
}

/// Delete the rule document. Returns whether one existed.
pub fn clear_rules(path: &Path) -> Result<bool, RulesStoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "Rule document cleared");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(RulesStoreError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
