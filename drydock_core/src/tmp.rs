//! Process-wide registry of temporary files created while materializing
//! templated values, removed at program exit.
//!
//! A cleaner design would pass this registry as an explicit dependency into
//! the synchronizer; this crate keeps the global-registry shape because the
//! contract it has to satisfy (files are deleted on any exit path, even a
//! panic elsewhere in the run) is most simply met by a `Drop` guard rather
//! than threading a handle through every call site that can bail out early.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

static FILES: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

fn record(path: PathBuf) {
    FILES.lock().unwrap().push(path);
}

/// Write `buf` to a fresh temp file named `drydock-tmp-*<suffix>` and record
/// it for cleanup.
pub fn write_file(buf: &[u8], suffix: &str) -> std::io::Result<PathBuf> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("drydock-tmp-").suffix(suffix);
    let mut file = builder.tempfile()?;
    use std::io::Write;
    file.write_all(buf)?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    record(path.clone());
    Ok(path)
}

/// Remove every file recorded so far, clearing the registry. Best-effort:
/// a file already gone is not an error.
pub fn clear_all() {
    let mut files = FILES.lock().unwrap();
    for path in files.drain(..) {
        let _ = std::fs::remove_file(&path);
    }
}

#[allow(dead_code)]
fn registered_for_test(path: &Path) -> bool {
    FILES.lock().unwrap().iter().any(|p| p == path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_files_are_cleared() {
        let path = write_file(b"hello", ".yaml").unwrap();
        assert!(path.exists());
        assert!(registered_for_test(&path));
        clear_all();
        assert!(!path.exists());
    }
}
