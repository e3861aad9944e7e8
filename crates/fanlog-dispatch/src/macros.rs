//! Logging macros
//!
//! Each macro records its call site as `file:line` in the record code. The
//! target defaults to the process-wide dispatcher; prefix the arguments with
//! `dispatcher =>` to log through a specific one:
//!
//! ```ignore
//! fanlog_dispatch::info!("listening on {}", addr);
//! fanlog_dispatch::error!(&dispatcher => "upload failed: {}", err);
//! ```

#[macro_export]
macro_rules! log {
    ($dispatcher:expr => $level:expr, $($arg:tt)+) => {{
        let dispatcher: &$crate::Dispatcher = $dispatcher;
        dispatcher.log($level, concat!(file!(), ":", line!()), format_args!($($arg)+));
    }};
    ($level:expr, $($arg:tt)+) => {
        $crate::log!($crate::global() => $level, $($arg)+)
    };
}

/// Log with structured fields attached to the record
#[macro_export]
macro_rules! log_with_fields {
    ($dispatcher:expr => $level:expr, $msg:expr, $($key:expr => $value:expr),+ $(,)?) => {{
        let dispatcher: &$crate::Dispatcher = $dispatcher;
        if dispatcher.enabled($level) {
            let record = $crate::Record::new($level, concat!(file!(), ":", line!()), $msg)
                $(.with_field($key, $value))+;
            dispatcher.dispatch(&record);
        }
    }};
    ($level:expr, $msg:expr, $($key:expr => $value:expr),+ $(,)?) => {
        $crate::log_with_fields!($crate::global() => $level, $msg, $($key => $value),+)
    };
}

#[macro_export]
macro_rules! debug {
    ($dispatcher:expr => $($arg:tt)+) => { $crate::log!($dispatcher => $crate::Level::Debug, $($arg)+) };
    ($($arg:tt)+) => { $crate::log!($crate::Level::Debug, $($arg)+) };
}

#[macro_export]
macro_rules! info {
    ($dispatcher:expr => $($arg:tt)+) => { $crate::log!($dispatcher => $crate::Level::Info, $($arg)+) };
    ($($arg:tt)+) => { $crate::log!($crate::Level::Info, $($arg)+) };
}

#[macro_export]
macro_rules! warn {
    ($dispatcher:expr => $($arg:tt)+) => { $crate::log!($dispatcher => $crate::Level::Warning, $($arg)+) };
    ($($arg:tt)+) => { $crate::log!($crate::Level::Warning, $($arg)+) };
}

#[macro_export]
macro_rules! error {
    ($dispatcher:expr => $($arg:tt)+) => { $crate::log!($dispatcher => $crate::Level::Error, $($arg)+) };
    ($($arg:tt)+) => { $crate::log!($crate::Level::Error, $($arg)+) };
}

/// Log at FATAL; the process keeps running
#[macro_export]
macro_rules! fatal {
    ($dispatcher:expr => $($arg:tt)+) => { $crate::log!($dispatcher => $crate::Level::Fatal, $($arg)+) };
    ($($arg:tt)+) => { $crate::log!($crate::Level::Fatal, $($arg)+) };
}

#[cfg(test)]
mod tests {
    use crate::{Dispatcher, Level, Record, Sink, SinkError};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Capture(Mutex<Vec<Record>>);

    impl Sink for Capture {
        fn name(&self) -> &'static str {
            "capture"
        }

        fn write(&self, record: &Record) -> Result<(), SinkError> {
            self.0.lock().push(record.clone());
            Ok(())
        }

        fn level(&self) -> Option<Level> {
            None
        }

        fn set_level(&self, _level: Level) {}
    }

    #[test]
    fn test_level_macros_use_call_site() {
        let dispatcher = Dispatcher::with_level(Level::Info);
        let sink = Arc::new(Capture::default());
        dispatcher.register(sink.clone());

        crate::debug!(&dispatcher => "hidden");
        crate::info!(&dispatcher => "user {} logged in", 42);
        crate::fatal!(&dispatcher => "disk full");

        let seen = sink.0.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].level(), Level::Info);
        assert_eq!(seen[0].info(), "user 42 logged in");
        assert!(seen[0].code().contains("macros.rs:"));
        assert_eq!(seen[1].level(), Level::Fatal);
    }

    #[test]
    fn test_log_with_fields() {
        let dispatcher = Dispatcher::new();
        let sink = Arc::new(Capture::default());
        dispatcher.register(sink.clone());

        crate::log_with_fields!(&dispatcher => Level::Error, "upload failed",
            "attempt" => 3,
            "bucket" => "media",
        );

        let seen = sink.0.lock();
        assert_eq!(seen[0].info(), "upload failed");
        assert_eq!(seen[0].fields().get("attempt"), Some(&serde_json::json!(3)));
        assert_eq!(seen[0].fields().get("bucket"), Some(&serde_json::json!("media")));
    }
}
