//! A line-buffered, prefixed writer over a shared logger.
//!
//! Safe to write from one producer at a time; several sinks may share the
//! same underlying logger concurrently without interleaving mid-line,
//! since each complete line is emitted as a single call into it.

use std::io::{self, Write};
use std::sync::Arc;

/// Where emitted lines go. The production sink logs through `tracing`;
/// tests substitute their own to assert on exact output.
pub trait Sink: Send + Sync {
    fn emit(&self, prefix: &str, line: &str);
}

pub struct TracingSink;

impl Sink for TracingSink {
    fn emit(&self, prefix: &str, line: &str) {
        tracing::info!(target: "drydock::external", "{prefix} {line}");
    }
}

pub struct LogWriter {
    prefix: String,
    buf: Vec<u8>,
    sink: Arc<dyn Sink>,
}

impl LogWriter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_sink(prefix, Arc::new(TracingSink))
    }

    pub fn with_sink(prefix: impl Into<String>, sink: Arc<dyn Sink>) -> Self {
        LogWriter { prefix: prefix.into(), buf: Vec::new(), sink }
    }

    fn drain_complete_lines(&mut self) {
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = String::from_utf8_lossy(&self.buf[..pos]).into_owned();
            self.sink.emit(&self.prefix, &line);
            self.buf.drain(..=pos);
        }
    }

    /// Emit any unterminated trailing fragment. Called automatically on drop.
    pub fn finish(&mut self) {
        self.drain_complete_lines();
        if !self.buf.is_empty() {
            let line = String::from_utf8_lossy(&self.buf).into_owned();
            self.sink.emit(&self.prefix, &line);
            self.buf.clear();
        }
    }
}

impl Write for LogWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        self.drain_complete_lines();
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CapturingSink(Mutex<Vec<String>>);

    impl Sink for CapturingSink {
        fn emit(&self, prefix: &str, line: &str) {
            self.0.lock().unwrap().push(format!("{prefix} {line}"));
        }
    }

    #[test]
    fn complete_and_trailing_lines_are_both_emitted() {
        let sink = Arc::new(CapturingSink(Mutex::new(Vec::new())));
        let mut w = LogWriter::with_sink("bbb", sink.clone());
        w.write_all(b"hello,world\nbbb").unwrap();
        w.finish();
        assert_eq!(sink.0.lock().unwrap().as_slice(), &["bbb hello,world".to_string(), "bbb bbb".to_string()]);
    }

    #[test]
    fn writes_spanning_multiple_calls_still_split_on_newline() {
        let sink = Arc::new(CapturingSink(Mutex::new(Vec::new())));
        let mut w = LogWriter::with_sink("p", sink.clone());
        w.write_all(b"one tw").unwrap();
        w.write_all(b"o\nthree\n").unwrap();
        drop(w);
        assert_eq!(sink.0.lock().unwrap().as_slice(), &["p one two".to_string(), "p three".to_string()]);
    }

    #[test]
    fn drop_flushes_unterminated_fragment() {
        let sink = Arc::new(CapturingSink(Mutex::new(Vec::new())));
        {
            let mut w = LogWriter::with_sink("p", sink.clone());
            w.write_all(b"no newline here").unwrap();
        }
        assert_eq!(sink.0.lock().unwrap().as_slice(), &["p no newline here".to_string()]);
    }
}
