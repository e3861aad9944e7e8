use chrono::{DateTime, Datelike, Local, Timelike};
use fanlog_core::{Level, LevelCell, Record, Sink, SinkError};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Flush to disk every this many lines
const FLUSH_EVERY: u64 = 100;

/// Expand the time tokens of a path pattern
///
/// `%Y` year, `%M` month, `%D` day, `%H` hour, `%m` minute. There is no
/// seconds token; unknown `%` sequences are kept verbatim.
pub fn expand_pattern(pattern: &str, at: DateTime<Local>) -> PathBuf {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('Y') => out.push_str(&format!("{:04}", at.year())),
            Some('M') => out.push_str(&format!("{:02}", at.month())),
            Some('D') => out.push_str(&format!("{:02}", at.day())),
            Some('H') => out.push_str(&format!("{:02}", at.hour())),
            Some('m') => out.push_str(&format!("{:02}", at.minute())),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }

    PathBuf::from(out)
}

struct OpenFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

struct FileState {
    current: Option<OpenFile>,
    lines_written: u64,
    closed: bool,
}

/// Writes records as plain text lines to a file whose name is derived from
/// the record time
///
/// A new file is opened whenever the expanded path changes, so a pattern
/// with `%H` starts a fresh file every hour.
pub struct FileSink {
    pattern: String,
    level: LevelCell,
    state: Mutex<FileState>,
}

impl FileSink {
    /// Create a new file sink following the global level
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            level: LevelCell::default(),
            state: Mutex::new(FileState {
                current: None,
                lines_written: 0,
                closed: false,
            }),
        }
    }

    /// Create a file sink with an explicit threshold
    pub fn with_level(pattern: impl Into<String>, level: Level) -> Self {
        let sink = Self::new(pattern);
        sink.level.set(level);
        sink
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Path of the file currently open, if any
    pub fn current_path(&self) -> Option<PathBuf> {
        self.state.lock().current.as_ref().map(|f| f.path.clone())
    }

    pub fn lines_written(&self) -> u64 {
        self.state.lock().lines_written
    }
}

/// Open `path` for appending, creating parent directories as needed
fn open_file(path: &Path) -> Result<OpenFile, SinkError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| SinkError::File(format!("Failed to create directory: {}", e)))?;
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SinkError::File(format!("Failed to open file {:?}: {}", path, e)))?;

    info!(path = %path.display(), "Opened log file for writing");

    Ok(OpenFile {
        path: path.to_path_buf(),
        writer: BufWriter::new(file),
    })
}

impl Sink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn label(&self) -> String {
        format!("file:{}", self.pattern)
    }

    fn init(&self) -> Result<(), SinkError> {
        if self.pattern.trim().is_empty() {
            return Err(SinkError::Config("file path pattern is empty".to_string()));
        }
        Ok(())
    }

    fn write(&self, record: &Record) -> Result<(), SinkError> {
        if self.level.filters(record.level()) {
            return Ok(());
        }
        let path = expand_pattern(&self.pattern, record.created_at());

        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }

        let switch = state.current.as_ref().map_or(true, |f| f.path != path);
        if switch {
            if let Some(mut old) = state.current.take() {
                if let Err(e) = old.writer.flush() {
                    warn!(path = %old.path.display(), error = %e, "Failed to flush previous log file");
                }
                debug!(from = %old.path.display(), to = %path.display(), "Switching log file");
            }
            state.current = Some(open_file(&path)?);
        }

        let file = state
            .current
            .as_mut()
            .ok_or_else(|| SinkError::File("File not open".to_string()))?;
        writeln!(file.writer, "{}", record)
            .map_err(|e| SinkError::File(format!("Failed to write to file: {}", e)))?;

        state.lines_written += 1;
        if state.lines_written % FLUSH_EVERY == 0 {
            if let Some(f) = state.current.as_mut() {
                f.writer
                    .flush()
                    .map_err(|e| SinkError::File(format!("Failed to flush file: {}", e)))?;
            }
        }

        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        if let Some(f) = self.state.lock().current.as_mut() {
            f.writer
                .flush()
                .map_err(|e| SinkError::File(format!("Failed to flush file: {}", e)))?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        state.closed = true;
        if let Some(mut f) = state.current.take() {
            f.writer
                .flush()
                .map_err(|e| SinkError::File(format!("Failed to flush file: {}", e)))?;
        }
        Ok(())
    }

    fn level(&self) -> Option<Level> {
        self.level.get()
    }

    fn set_level(&self, level: Level) {
        self.level.set(level);
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Some(f) = self.state.get_mut().current.as_mut() {
            if let Err(e) = f.writer.flush() {
                warn!(error = %e, "Failed to flush file on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 5, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_expand_pattern() {
        let path = expand_pattern("/tmp/logs/error%Y%M%D%H%m.log", at(18, 29));
        assert_eq!(path, PathBuf::from("/tmp/logs/error202401051829.log"));

        let path = expand_pattern("app-%Y-%M-%D.log", at(7, 3));
        assert_eq!(path, PathBuf::from("app-2024-01-05.log"));
    }

    #[test]
    fn test_expand_pattern_keeps_unknown_tokens() {
        let path = expand_pattern("a%%b%S%", at(0, 0));
        assert_eq!(path, PathBuf::from("a%%b%S%"));
    }

    #[test]
    fn test_write_text() {
        let dir = TempDir::new().unwrap();
        let pattern = dir.path().join("nested/app-%Y%M%D.log");
        let sink = FileSink::new(pattern.to_string_lossy());
        sink.init().unwrap();

        let record = Record::at(Level::Error, at(9, 0), "main.rs:7", "Test log message");
        sink.write(&record).unwrap();
        sink.flush().unwrap();

        let path = sink.current_path().unwrap();
        assert_eq!(path, dir.path().join("nested/app-20240105.log"));
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "2024/01/05 09:00:00 [ERROR] main.rs:7 Test log message\n");
    }

    #[test]
    fn test_switches_file_when_path_changes() {
        let dir = TempDir::new().unwrap();
        let pattern = dir.path().join("app-%H.log");
        let sink = FileSink::new(pattern.to_string_lossy());

        sink.write(&Record::at(Level::Info, at(10, 0), "f.rs:1", "first")).unwrap();
        sink.write(&Record::at(Level::Info, at(10, 30), "f.rs:1", "second")).unwrap();
        sink.write(&Record::at(Level::Info, at(11, 0), "f.rs:1", "third")).unwrap();
        sink.close().unwrap();

        let ten = fs::read_to_string(dir.path().join("app-10.log")).unwrap();
        let eleven = fs::read_to_string(dir.path().join("app-11.log")).unwrap();
        assert_eq!(ten.lines().count(), 2);
        assert!(eleven.contains("third"));
        assert_eq!(sink.lines_written(), 3);
    }

    #[test]
    fn test_level_filter_and_write_after_close() {
        let dir = TempDir::new().unwrap();
        let pattern = dir.path().join("errors.log");
        let sink = FileSink::with_level(pattern.to_string_lossy(), Level::Error);

        sink.write(&Record::at(Level::Warning, at(1, 0), "f.rs:1", "skipped")).unwrap();
        sink.write(&Record::at(Level::Fatal, at(1, 0), "f.rs:1", "kept")).unwrap();
        sink.close().unwrap();
        sink.write(&Record::at(Level::Fatal, at(1, 0), "f.rs:1", "late")).unwrap();

        let content = fs::read_to_string(&pattern).unwrap();
        assert_eq!(content.lines().collect::<Vec<_>>().len(), 1);
        assert!(content.contains("kept"));
    }

    #[test]
    fn test_empty_pattern_fails_init() {
        let sink = FileSink::new("  ");
        assert!(matches!(sink.init(), Err(SinkError::Config(_))));
    }
}
