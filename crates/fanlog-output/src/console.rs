use colored::{ColoredString, Colorize};
use fanlog_core::{Level, LevelCell, Record, Sink, SinkError};
use parking_lot::Mutex;
use std::io::{self, Write};

/// Writes records to stdout, one line each
pub struct ConsoleSink {
    level: LevelCell,
    color: bool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    /// Create a new console sink following the global level
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    /// Create a console sink with an explicit threshold
    pub fn with_level(level: Level) -> Self {
        let sink = Self::new();
        sink.level.set(level);
        sink
    }

    /// Write to any destination instead of stdout
    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            level: LevelCell::default(),
            color: false,
            out: Mutex::new(out),
        }
    }

    /// Enable or disable ANSI colors
    pub fn color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Format a record according to the color setting
    fn format_record(&self, record: &Record) -> String {
        if self.color {
            format_colored(record)
        } else {
            record.to_string()
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

fn colored_level(level: Level) -> ColoredString {
    let label = level.as_str();
    match level {
        Level::Debug => label.blue(),
        Level::Info => label.green(),
        Level::Warning => label.yellow(),
        Level::Error => label.red(),
        Level::Fatal => label.magenta(),
    }
}

fn format_colored(record: &Record) -> String {
    format!(
        "{} [{}] {} {}",
        record.time().cyan(),
        colored_level(record.level()),
        record.code().black().on_white(),
        record.info()
    )
}

impl Sink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    fn write(&self, record: &Record) -> Result<(), SinkError> {
        if self.level.filters(record.level()) {
            return Ok(());
        }
        let line = self.format_record(record);

        let mut out = self.out.lock();
        writeln!(out, "{}", line).map_err(|e| SinkError::Console(e.to_string()))
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.out
            .lock()
            .flush()
            .map_err(|e| SinkError::Console(e.to_string()))
    }

    fn level(&self) -> Option<Level> {
        self.level.get()
    }

    fn set_level(&self, level: Level) {
        self.level.set(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use std::sync::Arc;

    /// Cloneable in-memory writer
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    fn record(level: Level) -> Record {
        let at = Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Record::at(level, at, "main.rs:42", "Test message")
    }

    #[test]
    fn test_plain_line() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::with_writer(Box::new(buf.clone()));

        sink.write(&record(Level::Error)).unwrap();
        assert_eq!(buf.contents(), "2024/03/01 12:00:00 [ERROR] main.rs:42 Test message\n");
    }

    #[test]
    fn test_colored_line() {
        colored::control::set_override(true);
        let buf = SharedBuf::default();
        let sink = ConsoleSink::with_writer(Box::new(buf.clone())).color(true);

        sink.write(&record(Level::Warning)).unwrap();
        let out = buf.contents();
        assert!(out.contains("\u{1b}["));
        assert!(out.contains("WARN"));
        assert!(out.contains("Test message"));
    }

    #[test]
    fn test_level_filter() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::with_writer(Box::new(buf.clone()));
        sink.set_level(Level::Warning);

        sink.write(&record(Level::Info)).unwrap();
        sink.write(&record(Level::Fatal)).unwrap();

        let out = buf.contents();
        assert_eq!(out.lines().count(), 1);
        assert!(out.contains("[FATAL]"));
    }
}
