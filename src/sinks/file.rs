//! Plain file sink: appends formatted lines, never rotates

use crate::core::{Formatter, LogEvent, LoggerError, Result, Sink};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    formatter: Arc<dyn Formatter>,
}

impl FileSink {
    /// Open (or create) `path` for appending
    ///
    /// # Errors
    ///
    /// Returns error if the parent directory or the file cannot be created
    pub fn new(path: impl Into<PathBuf>, formatter: Arc<dyn Formatter>) -> Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            formatter,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Create the parent directory if needed and open `path` for appending
pub(crate) fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            LoggerError::io_operation(
                "create log directory",
                format!("Failed to create directory '{}'", parent.display()),
                e,
            )
        })?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            LoggerError::file_sink(path.display().to_string(), format!("Failed to open: {}", e))
        })
}

impl Sink for FileSink {
    fn emit(&mut self, event: &LogEvent) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| LoggerError::sink_closed("file"))?;

        let mut line = self.formatter.format(event);
        line.push('\n');
        writer.write_all(line.as_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        // Ensure all buffered data is flushed to disk
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LogLevel, TextFormatter};
    use tempfile::tempdir;

    #[test]
    fn test_file_sink_writes_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("plain.log");

        let mut sink = FileSink::new(&path, Arc::new(TextFormatter::new())).unwrap();
        for i in 0..3 {
            let event = LogEvent::new("file", LogLevel::Info, "entry {}").with_arg(i);
            sink.emit(&event).unwrap();
        }
        sink.close().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.contains("entry 2"));
    }

    #[test]
    fn test_emit_after_close_fails() {
        let dir = tempdir().unwrap();
        let mut sink =
            FileSink::new(dir.path().join("closed.log"), Arc::new(TextFormatter::new())).unwrap();
        sink.close().unwrap();

        let event = LogEvent::new("file", LogLevel::Info, "late");
        assert!(matches!(sink.emit(&event), Err(LoggerError::SinkClosed(_))));
    }
}
