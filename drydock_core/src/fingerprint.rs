//! Content fingerprints.
//!
//! A fingerprint is a lowercase hex MD5 digest. It is used uniformly for
//! file contents, directory contents, chart bundles, raw manifests and
//! composite release signatures. MD5 is chosen for speed and stability,
//! not cryptographic assurance — see the module-level note in the design
//! doc before reaching for this anywhere security-sensitive.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use md5::{Digest, Md5};
use walkdir::WalkDir;

use crate::error::{Error, Result};

const CRLF: [u8; 2] = [0x0D, 0x0A];

/// Hex MD5 of an in-memory byte slice.
pub fn of_bytes(buf: &[u8]) -> String {
    let mut h = Md5::new();
    h.update(buf);
    hex::encode(h.finalize())
}

/// Hex MD5 of a file's contents, streamed rather than read whole.
pub fn of_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut f = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut h = Md5::new();
    stream_into(&mut f, &mut h).map_err(|e| Error::io(path, e))?;
    Ok(hex::encode(h.finalize()))
}

/// Hex MD5 of a directory's contents.
///
/// Walks `path` following symlinks, skipping any directory or regular file
/// whose basename starts with `.`. Remaining files are collected as
/// absolute paths, sorted by raw byte ordering, and streamed into one MD5
/// state separated by a literal `\r\n` after each file — this separator
/// and the sort order are load-bearing: they are what make the digest
/// stable across platforms and directory-walk orders.
pub fn of_dir(path: impl AsRef<Path>) -> Result<String> {
    let root = path.as_ref();
    let abs_root = std::fs::canonicalize(root).map_err(|e| Error::io(root, e))?;

    let mut files: Vec<Vec<u8>> = Vec::new();

    let walker = WalkDir::new(&abs_root).follow_links(true).into_iter().filter_entry(|e| {
        if e.depth() == 0 {
            return true;
        }
        let name = e.file_name().to_string_lossy();
        if e.file_type().is_dir() {
            !name.starts_with('.')
        } else {
            true
        }
    });

    for entry in walker {
        let entry = entry.map_err(|e| {
            Error::io(
                e.path().unwrap_or(&abs_root).to_path_buf(),
                io::Error::new(io::ErrorKind::Other, e.to_string()),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        files.push(path_bytes(entry.path()));
    }

    files.sort();

    let mut h = Md5::new();
    for raw in &files {
        let p = bytes_to_path(raw);
        let mut f = File::open(&p).map_err(|e| Error::io(&p, e))?;
        stream_into(&mut f, &mut h).map_err(|e| Error::io(&p, e))?;
        h.update(CRLF);
    }

    Ok(hex::encode(h.finalize()))
}

fn stream_into(r: &mut impl Read, h: &mut Md5) -> io::Result<()> {
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        h.update(&buf[..n]);
    }
    Ok(())
}

#[cfg(unix)]
fn path_bytes(p: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    p.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_bytes(p: &Path) -> Vec<u8> {
    p.to_string_lossy().as_bytes().to_vec()
}

#[cfg(unix)]
fn bytes_to_path(b: &[u8]) -> std::path::PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    std::path::PathBuf::from(OsStr::from_bytes(b))
}

#[cfg(not(unix))]
fn bytes_to_path(b: &[u8]) -> std::path::PathBuf {
    std::path::PathBuf::from(String::from_utf8_lossy(b).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn of_bytes_matches_known_md5() {
        assert_eq!(of_bytes(b"hello,world"), "3cb95cfbe1035bce8c448fcaf80fe7d9");
    }

    #[test]
    fn of_file_matches_known_md5() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streamfile.txt");
        std::fs::write(&path, b"hello,world").unwrap();
        assert_eq!(of_file(&path).unwrap(), "3cb95cfbe1035bce8c448fcaf80fe7d9");
    }

    #[test]
    fn of_dir_is_crlf_joined_sorted_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"hello").unwrap();

        let got = of_dir(dir.path()).unwrap();
        let want = of_bytes(b"hello\r\nhello\r\n");
        assert_eq!(got, want);
    }

    #[test]
    fn of_dir_skips_dotfiles_and_dot_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"nope").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("x"), b"nope").unwrap();

        let got = of_dir(dir.path()).unwrap();
        let want = of_bytes(b"hello\r\n");
        assert_eq!(got, want);
    }

    #[test]
    fn of_dir_is_order_independent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("z.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"2").unwrap();
        std::fs::write(dir.path().join("m.txt"), b"3").unwrap();

        let a = of_dir(dir.path()).unwrap();
        let b = of_dir(dir.path()).unwrap();
        assert_eq!(a, b);
    }
}
