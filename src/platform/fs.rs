// KwTheme - platform/fs.rs
//
// Filesystem helpers: lossy reads, size checks, and atomic writes.
//
// Atomic writes go to a sibling temp file which is then renamed over the
// destination, so readers never observe a half-written file.

use std::io;
use std::path::{Path, PathBuf};

/// Read the full content of a file as a string.
///
/// For files with invalid UTF-8, uses lossy conversion.
pub fn read_file_lossy(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// File size in bytes.
pub fn file_size(path: &Path) -> io::Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

/// Sibling temp path used while writing `path`: `<file name>.tmp`.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `bytes` to `path` atomically (write temp -> rename).
///
/// The temp file is removed if either step fails.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = temp_sibling(path);
    if let Err(e) = std::fs::write(&tmp, bytes) {
        remove_quietly(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        remove_quietly(&tmp);
        e
    })
}

/// Remove a file, ignoring "not found" and logging anything else.
pub fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Failed to remove temporary file"
        ),
    }
}
