//! Destinations for formatted event lines.

use std::io::Write;
use std::sync::{Arc, Mutex};

use super::LogLevel;

/// Accepts formatted lines. Implementations must not panic on I/O failure.
pub trait LogSink: Send + Sync {
    fn write(&self, level: LogLevel, line: &str);
}

/// Writes each line to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn write(&self, _level: LogLevel, line: &str) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        // 파이프가 닫혀도 서비스는 계속 동작해야 함
        let _ = writeln!(handle, "{}", line);
    }
}

/// Forwards lines into `tracing` at the event's level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, level: LogLevel, line: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(target: "gateway::events", "{}", line),
            LogLevel::Debug => tracing::debug!(target: "gateway::events", "{}", line),
            LogLevel::Info => tracing::info!(target: "gateway::events", "{}", line),
            LogLevel::Warn => tracing::warn!(target: "gateway::events", "{}", line),
            LogLevel::Error | LogLevel::Fatal => {
                tracing::error!(target: "gateway::events", "{}", line)
            }
        }
    }
}

/// Keeps every line in memory, for embedding applications that collect
/// output themselves and for tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn levels(&self) -> Vec<LogLevel> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(level, _)| *level)
            .collect()
    }

    /// Lines containing `needle`.
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.contains(needle))
            .collect()
    }
}

impl LogSink for MemorySink {
    fn write(&self, level: LogLevel, line: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((level, line.to_string()));
    }
}
