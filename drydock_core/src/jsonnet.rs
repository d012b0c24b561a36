//! Thin wrapper around the Jsonnet evaluator.
//!
//! Isolated in its own module so the one external variable binding the rest
//! of this crate relies on (`NAMESPACE`) has exactly one call site to get
//! right, and so a different Jsonnet engine can be swapped in without
//! touching callers.
//!
//! Shells out to the `jsonnet` binary rather than embedding a Jsonnet
//! evaluator crate, the same way [`crate::sync`] shells out to `kubectl` and
//! `helm` instead of reimplementing their logic in-process.

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

/// Evaluate a `.jsonnet` file with `NAMESPACE` bound to `namespace`, returning
/// the rendered JSON text (an object or an array at the top level).
pub fn evaluate_file(path: impl AsRef<Path>, namespace: &str) -> Result<String> {
    let path = path.as_ref();

    let output = Command::new("jsonnet")
        .arg("--ext-str")
        .arg(format!("NAMESPACE={namespace}"))
        .arg(path)
        .output()
        .map_err(|e| Error::io(path, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Jsonnet(format!("{}: {}", path.display(), stderr.trim())));
    }

    String::from_utf8(output.stdout).map_err(|e| Error::Jsonnet(format!("{}: non-utf8 output: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    // Jsonnet evaluation shells out to a real `jsonnet` binary; exercised
    // indirectly through `manifest::tests` and `sync::tests` against
    // fixtures that stick to plain YAML/JSON, since this module's only job
    // is building the right command line.
}
